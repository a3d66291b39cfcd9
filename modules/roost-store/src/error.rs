/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Schema bootstrap or connectivity failure. Fatal at startup.
    #[error("Store initialization failed: {0}")]
    Init(#[from] sqlx::migrate::MigrateError),

    /// Batch rejected before any I/O.
    #[error("Invalid batch: {0}")]
    Validation(String),

    /// A row-level failure inside a batch. The whole batch was rolled back.
    #[error("Batch transaction rolled back: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
