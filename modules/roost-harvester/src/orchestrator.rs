use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use roost_common::Account;

use crate::collector::Collector;
use crate::context::CycleContext;
use crate::error::HarvestError;
use crate::traits::HarvestStore;

/// Totals for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub accounts: usize,
    pub posts_collected: usize,
    pub posts_upserted: usize,
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accounts={} collected={} upserted={}",
            self.accounts, self.posts_collected, self.posts_upserted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleStats),
    /// A termination request was honoured; the active session was cleaned up.
    Cancelled,
    /// Another cycle was already running on this orchestrator.
    Skipped,
}

enum AccountOutcome {
    Done { collected: usize, upserted: usize },
    Cancelled,
}

/// Releases the in-progress flag when the cycle ends, however it ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one collect-and-persist pass over every configured account,
/// strictly one account at a time.
pub struct Orchestrator {
    store: Arc<dyn HarvestStore>,
    collector: Arc<dyn Collector>,
    pacing: Duration,
    cancel: CancellationToken,
    context: CycleContext,
    in_progress: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn HarvestStore>,
        collector: Arc<dyn Collector>,
        pacing: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            collector,
            pacing,
            cancel,
            context: CycleContext::new(),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &CycleContext {
        &self.context
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run one full cycle. Any error is fatal for the process; the next
    /// scheduled cycle is the only retry.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, HarvestError> {
        let Some(_guard) = CycleGuard::try_acquire(&self.in_progress) else {
            warn!("Harvest cycle already in progress, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        if self.cancel.is_cancelled() {
            return Ok(self.shut_down().await);
        }

        if let Err(e) = self.store.initialize().await {
            error!(error = %e, "Store initialization failed");
            return Err(HarvestError::StoreInit(e));
        }

        let accounts = self.store.list_accounts().await.map_err(|e| {
            error!(error = %e, "Failed to list accounts");
            HarvestError::ListAccounts(e)
        })?;

        if accounts.is_empty() {
            error!("No accounts found in the database");
            return Err(HarvestError::NoAccounts);
        }
        info!(count = accounts.len(), "Found accounts");

        let mut stats = CycleStats::default();
        for (index, account) in accounts.iter().enumerate() {
            if index > 0 && !self.pace().await {
                return Ok(self.shut_down().await);
            }
            if self.cancel.is_cancelled() {
                return Ok(self.shut_down().await);
            }

            match self.harvest_account(account).await? {
                AccountOutcome::Done {
                    collected,
                    upserted,
                } => {
                    stats.accounts += 1;
                    stats.posts_collected += collected;
                    stats.posts_upserted += upserted;
                }
                AccountOutcome::Cancelled => return Ok(self.shut_down().await),
            }
        }

        info!(%stats, "Harvest cycle complete");
        Ok(CycleOutcome::Completed(stats))
    }

    async fn harvest_account(&self, account: &Account) -> Result<AccountOutcome, HarvestError> {
        let handle = account.handle.as_str();
        info!(handle, "Running collector");

        let session = self
            .collector
            .open_session(account)
            .await
            .map_err(|source| {
                error!(handle, error = %source, "Collector failed to start");
                HarvestError::Collector {
                    handle: handle.to_string(),
                    source,
                }
            })?;
        self.context.activate(handle, session.clone());

        let collected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(AccountOutcome::Cancelled),
            result = session.collect() => result,
        };
        let posts = match collected {
            Ok(posts) => posts,
            Err(source) => {
                self.context.clear();
                error!(handle, error = %source, "Collector failed");
                return Err(HarvestError::Collector {
                    handle: handle.to_string(),
                    source,
                });
            }
        };

        if posts.is_empty() {
            self.context.clear();
            info!(handle, "Collector returned no posts, nothing to persist");
            return Ok(AccountOutcome::Done {
                collected: 0,
                upserted: 0,
            });
        }

        // Never raced against cancellation: the batch commits or rolls back first.
        let saved = self.store.save_batch(&posts).await;
        if self.cancel.is_cancelled() {
            if let Err(e) = &saved {
                error!(handle, error = %e, "Batch failed during shutdown");
            }
            return Ok(AccountOutcome::Cancelled);
        }
        self.context.clear();

        let summary = saved.map_err(|source| {
            error!(handle, error = %source, "Failed to persist posts");
            HarvestError::Persist {
                handle: handle.to_string(),
                source,
            }
        })?;

        info!(handle, %summary, "Persisted posts");
        Ok(AccountOutcome::Done {
            collected: posts.len(),
            upserted: summary.upserted,
        })
    }

    /// Wait out the inter-account delay. Returns false if cancelled meanwhile.
    async fn pace(&self) -> bool {
        info!(secs = self.pacing.as_secs(), "Waiting before the next account");
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.pacing) => true,
        }
    }

    async fn shut_down(&self) -> CycleOutcome {
        warn!("Received termination signal, cleaning up");
        self.context.cleanup().await;
        CycleOutcome::Cancelled
    }
}
