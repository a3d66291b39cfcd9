// Store boundary for the orchestrator.
//
// PostStore is the production implementation; testing::MockStore keeps
// everything in memory so cycle behaviour is testable without Postgres.

use async_trait::async_trait;

use roost_common::{Account, Post, SaveSummary};
use roost_store::{PostStore, StoreError};

#[async_trait]
pub trait HarvestStore: Send + Sync {
    /// Idempotent schema bootstrap.
    async fn initialize(&self) -> Result<(), StoreError>;

    /// Accounts to collect for, in processing order.
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// All-or-nothing upsert of one account's batch.
    async fn save_batch(&self, posts: &[Post]) -> Result<SaveSummary, StoreError>;
}

#[async_trait]
impl HarvestStore for PostStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        PostStore::initialize(self).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        PostStore::list_accounts(self).await
    }

    async fn save_batch(&self, posts: &[Post]) -> Result<SaveSummary, StoreError> {
        PostStore::save_batch(self, posts).await
    }
}
