use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the object mapper.
///
/// Key and filter validation errors are always produced before the store is
/// contacted. Failures coming from the store itself are wrapped in
/// [`ModelError::Store`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("{model}: missing key field '{field}'")]
    MissingKeyField { model: String, field: String },

    #[error("Unsupported filter '{filter}': unknown suffix '__{suffix}'")]
    UnsupportedFilter { filter: String, suffix: String },

    #[error("Invalid filter field '{field}': not part of the key schema")]
    InvalidFilterField { field: String },

    #[error("Missing required field '{field}'")]
    MissingRequiredField { field: String },

    #[error("{model} not found: {key}")]
    RecordNotFound { model: String, key: String },

    #[error("{model} already exists: {key}")]
    DuplicateRecord { model: String, key: String },

    #[error("{model}: unexpected field(s) {fields:?}")]
    UnknownField { model: String, fields: Vec<String> },

    #[error("Field '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid key template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

/// Result type for mapper operations.
pub type Result<T> = std::result::Result<T, ModelError>;
