use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::collector::CollectorSession;

/// Upper bound on the shutdown logout. Past it the session is abandoned.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

struct ActiveSession {
    handle: String,
    session: Arc<dyn CollectorSession>,
}

/// Per-orchestrator state shared with the shutdown path: which collector
/// session, if any, is live right now.
#[derive(Default)]
pub struct CycleContext {
    active: Mutex<Option<ActiveSession>>,
}

impl CycleContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the session now collecting for `handle`.
    pub fn activate(&self, handle: &str, session: Arc<dyn CollectorSession>) {
        *self.slot() = Some(ActiveSession {
            handle: handle.to_string(),
            session,
        });
    }

    pub fn clear(&self) {
        self.slot().take();
    }

    pub fn active_handle(&self) -> Option<String> {
        self.slot().as_ref().map(|a| a.handle.clone())
    }

    /// Best-effort logout of the active session, bounded by [`CLEANUP_TIMEOUT`].
    /// Failures and timeouts are logged, never returned.
    /// Returns the handle that was cleaned up.
    pub async fn cleanup(&self) -> Option<String> {
        let active = self.slot().take()?;
        let handle = active.handle.as_str();
        match tokio::time::timeout(CLEANUP_TIMEOUT, active.session.logout()).await {
            Ok(Ok(())) => info!(handle, "Logged out collector session"),
            Ok(Err(e)) => error!(handle, error = %e, "Error during collector cleanup"),
            Err(_) => warn!(
                handle,
                timeout_secs = CLEANUP_TIMEOUT.as_secs(),
                "Collector logout timed out, abandoning session"
            ),
        }
        Some(active.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSession;

    #[tokio::test]
    async fn cleanup_logs_out_once_and_clears() {
        let context = CycleContext::new();
        let session = Arc::new(ScriptedSession::new(Vec::new()));
        context.activate("alice", session.clone());

        assert_eq!(context.active_handle().as_deref(), Some("alice"));
        assert_eq!(context.cleanup().await.as_deref(), Some("alice"));
        assert_eq!(context.cleanup().await, None);
        assert_eq!(session.logouts(), 1);
        assert!(context.active_handle().is_none());
    }

    #[tokio::test]
    async fn failed_logout_is_swallowed() {
        let context = CycleContext::new();
        context.activate("bob", Arc::new(ScriptedSession::new(Vec::new()).failing_logout()));

        assert_eq!(context.cleanup().await.as_deref(), Some("bob"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_logout_is_abandoned_after_timeout() {
        let context = CycleContext::new();
        let session = Arc::new(ScriptedSession::new(Vec::new()).hanging_logout());
        context.activate("dave", session.clone());
        let started = tokio::time::Instant::now();

        assert_eq!(context.cleanup().await.as_deref(), Some("dave"));
        let waited = started.elapsed();
        assert!(waited >= CLEANUP_TIMEOUT && waited < CLEANUP_TIMEOUT + Duration::from_secs(1));
        assert_eq!(session.logouts(), 1);
        assert!(context.active_handle().is_none());
    }

    #[tokio::test]
    async fn cleared_context_has_nothing_to_clean() {
        let context = CycleContext::new();
        context.activate("carol", Arc::new(ScriptedSession::new(Vec::new())));
        context.clear();

        assert_eq!(context.cleanup().await, None);
    }
}
