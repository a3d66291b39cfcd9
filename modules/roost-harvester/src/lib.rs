pub mod collector;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use collector::{ApifyCollector, Collector, CollectorSession};
pub use context::{CycleContext, CLEANUP_TIMEOUT};
pub use error::{CollectorError, HarvestError};
pub use orchestrator::{CycleOutcome, CycleStats, Orchestrator};
pub use scheduler::Scheduler;
pub use traits::HarvestStore;
