//! In-memory storage backend for testing.
//!
//! Items live in ordered maps wrapped in `Arc<RwLock<_>>`. Every operation
//! is counted, so tests can assert that validation failures never reach the
//! store.
//!
//! # Example
//!
//! ```rust,ignore
//! use cloudlydb::storage::inmemory::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! // Use store for testing...
//! assert_eq!(store.calls().total(), 0);
//! ```

mod store;

pub use store::{CallCounts, InMemoryStore};
