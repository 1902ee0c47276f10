pub mod device_queries;
pub mod export_queries;
pub mod reading_queries;

/// Failures surfaced by the row-store collaborator. Persistence errors
/// are fatal for the enclosing request; there are no retries here.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unknown device: {0}")]
    UnknownDevice(String),
}
