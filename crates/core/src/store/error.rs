use thiserror::Error;

/// Errors reported by an [`ItemStore`](super::ItemStore) backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Condition check failed: {0}")]
    ConditionFailed(String),
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Throughput exceeded: {0}")]
    Throttled(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Service error: {0}")]
    Service(String),
    #[error("Connection failed: {0}")]
    Connection(String),
}
