use telemetry_client::StoreError;

/// Engine-level failure taxonomy. Empty query results are not errors;
/// they yield empty/zero-valued results at the call site. Broadcast
/// delivery failures are handled inside the registry and never reach
/// this type.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
