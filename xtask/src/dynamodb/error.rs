//! Error types for DynamoDB operations.

use thiserror::Error;

/// Result type alias for dynamodb module.
pub type Result<T> = std::result::Result<T, DynamodbError>;

/// Errors that can occur during DynamoDB operations.
#[derive(Error, Debug)]
pub enum DynamodbError {
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Invalid index name '{0}': use letters, digits, '_', '-' or '.'")]
    InvalidIndexName(String),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Operation cancelled by user")]
    UserCancelled,

    #[error("Timeout waiting for table to become active")]
    TableActivationTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_index_name_display() {
        let error = DynamodbError::InvalidIndexName("by name".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid index name 'by name': use letters, digits, '_', '-' or '.'"
        );
    }
}
