pub mod error;
pub mod store;
#[cfg(feature = "test-utils")]
pub mod testutil;

pub use error::{Result, StoreError};
pub use store::{AuditActors, PostStore, StoredPost, CHUNK_SIZE};
