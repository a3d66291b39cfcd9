use thiserror::Error;

use roost_store::StoreError;

/// Failure inside a collector session.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Apify error: {0}")]
    Apify(#[from] apify_client::ApifyError),

    #[error("Session error: {0}")]
    Session(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Anything that ends a harvest cycle. None of these are retried locally.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Store initialization failed: {0}")]
    StoreInit(#[source] StoreError),

    #[error("Failed to enumerate accounts: {0}")]
    ListAccounts(#[source] StoreError),

    #[error("No accounts configured")]
    NoAccounts,

    #[error("Collector failed for @{handle}: {source}")]
    Collector {
        handle: String,
        #[source]
        source: CollectorError,
    },

    #[error("Persisting posts for @{handle} failed: {source}")]
    Persist {
        handle: String,
        #[source]
        source: StoreError,
    },

    #[error("Invalid schedule expression: {0}")]
    Schedule(#[from] cron::error::Error),
}
