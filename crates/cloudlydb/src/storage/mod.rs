//! Storage backend implementations.
//!
//! This module provides concrete implementations of the
//! [`ItemStore`](cloudlydb_core::ItemStore) trait defined in
//! `cloudlydb_core::store`. Backends are selected at compile time via
//! feature flags and can be enabled together.
//!
//! # Feature Flags
//!
//! - `inmemory` (default): in-memory backend for tests and development
//! - `dynamodb` (default): AWS DynamoDB backend using `aws-sdk-dynamodb`
//!
//! # Examples
//!
//! Build without the AWS SDK:
//! ```bash
//! cargo build -p cloudlydb --no-default-features --features inmemory
//! ```

#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryStore;

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbStore;
