use async_trait::async_trait;

use crate::attribute::Item;
use crate::keys::Key;
use crate::model::TableBinding;
use crate::query::QueryRequest;
use crate::update::UpdateExpression;

use super::{QueryPage, StoreError, WriteCondition};

/// The wrapped store client.
///
/// Every method is a single request. The binding names the table and its
/// key attributes. Backends map their own failures to [`StoreError`] and
/// never retry.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Point read.
    async fn get_item(&self, table: &TableBinding, key: &Key) -> Result<Option<Item>, StoreError>;

    /// Write a full item, optionally conditioned on its existence.
    async fn put_item(
        &self,
        table: &TableBinding,
        item: Item,
        condition: Option<WriteCondition>,
    ) -> Result<(), StoreError>;

    /// Partial update. Returns the item as it is after the update.
    async fn update_item(
        &self,
        table: &TableBinding,
        key: &Key,
        update: &UpdateExpression,
        condition: Option<WriteCondition>,
    ) -> Result<Item, StoreError>;

    /// Fetch one page of a key-condition query.
    async fn query(&self, request: &QueryRequest) -> Result<QueryPage, StoreError>;

    /// Delete an item. Returns the old item when one existed.
    async fn delete_item(&self, table: &TableBinding, key: &Key) -> Result<Option<Item>, StoreError>;
}
