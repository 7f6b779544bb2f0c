mod error;
mod traits;
mod types;

pub use error::StoreError;
pub use traits::ItemStore;
pub use types::{QueryPage, WriteCondition};
