//! DynamoDB storage backend implementation.
//!
//! This module provides a DynamoDB-based implementation of the
//! [`ItemStore`](cloudlydb_core::ItemStore) trait using `aws-sdk-dynamodb`.

mod conversions;
mod error;
mod store;

pub use store::DynamoDbStore;
