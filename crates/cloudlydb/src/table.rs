//! Untyped table commands.
//!
//! [`Table`] works on raw JSON data under explicit keys, for callers that
//! manage their own key layout instead of declaring a [`Model`].
//!
//! [`Model`]: cloudlydb_core::Model

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde_json::{Map, Value};

use cloudlydb_core::model::UPDATED_ATTRIBUTE;
use cloudlydb_core::{
    merge_counters, Attribute, Cursor, Item, ItemStore, Key, ModelError, Query, Result,
    TableBinding, UpdateExpression,
};

use crate::manager::timestamp;
use crate::records::item_stream;

/// Field stamped on accumulated counters when they are first written.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// One page of raw items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TablePage {
    pub items: Vec<Value>,
    pub cursor: Option<Cursor>,
}

/// Transform applied to data before it is written.
pub type DataShaper = Arc<dyn Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync>;

/// A table bound to a store.
#[derive(Clone)]
pub struct Table {
    store: Arc<dyn ItemStore>,
    binding: TableBinding,
    shaper: Option<DataShaper>,
}

fn item_to_json(item: &Item) -> Result<Value> {
    let mut object = Map::new();
    for (name, value) in item {
        object.insert(name.clone(), value.to_json()?);
    }
    Ok(Value::Object(object))
}

fn data_map(data: &Map<String, Value>) -> HashMap<String, Attribute> {
    data.iter()
        .map(|(name, value)| (name.clone(), Attribute::from_json(value)))
        .collect()
}

impl Table {
    pub fn new(store: Arc<dyn ItemStore>, binding: TableBinding) -> Self {
        Self {
            store,
            binding,
            shaper: None,
        }
    }

    /// Reshape the data of every [`Table::put`] before it is stored.
    pub fn with_data_shaper<F>(mut self, shaper: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.shaper = Some(Arc::new(shaper));
        self
    }

    pub fn binding(&self) -> &TableBinding {
        &self.binding
    }

    /// Write `data` at `key`, replacing whatever is there.
    pub async fn put(&self, key: &Key, data: &Map<String, Value>) -> Result<Value> {
        let data = match &self.shaper {
            Some(shaper) => data_map(&shaper(data.clone())),
            None => data_map(data),
        };
        let item = self.binding.new_item(key, data, &timestamp());
        tracing::debug!(table = %self.binding.table_name, %key, "put");
        self.store.put_item(&self.binding, item.clone(), None).await?;
        item_to_json(&item)
    }

    /// The whole stored item, keys included.
    pub async fn get(&self, key: &Key) -> Result<Option<Value>> {
        tracing::debug!(table = %self.binding.table_name, %key, "get");
        self.store
            .get_item(&self.binding, key)
            .await?
            .as_ref()
            .map(item_to_json)
            .transpose()
    }

    /// Set the given data fields, descending into nested maps, and stamp
    /// the update time. Returns the item as stored afterwards.
    ///
    /// Name a field with a `:$` suffix to replace a nested map whole.
    pub async fn update(&self, key: &Key, data: &Map<String, Value>) -> Result<Value> {
        let mut item = HashMap::from([(UPDATED_ATTRIBUTE.to_string(), Attribute::s(timestamp()))]);
        if !data.is_empty() {
            item.insert(self.binding.data_attribute.clone(), Attribute::M(data_map(data)));
        }
        tracing::debug!(table = %self.binding.table_name, %key, "update");

        let updated = self
            .store
            .update_item(&self.binding, key, &UpdateExpression::set(&item), None)
            .await?;
        item_to_json(&updated)
    }

    /// Add numeric deltas to data fields, creating missing ones.
    pub async fn increment(&self, key: &Key, deltas: &Map<String, Value>) -> Result<Value> {
        if deltas.is_empty() {
            return Err(ModelError::InvalidArguments(
                "increment requires at least one counter".to_string(),
            ));
        }
        if let Some((name, value)) = first_non_number(deltas, "") {
            return Err(ModelError::TypeMismatch {
                field: name,
                expected: "number",
                actual: cloudlydb_core::attribute::json_kind(value),
            });
        }
        let item = HashMap::from([(
            self.binding.data_attribute.clone(),
            Attribute::M(data_map(deltas)),
        )]);
        tracing::debug!(table = %self.binding.table_name, %key, "increment");

        let updated = self
            .store
            .update_item(&self.binding, key, &UpdateExpression::add(&item), None)
            .await?;
        item_to_json(&updated)
    }

    /// One page of items. The query's partition key is required.
    pub async fn query(&self, query: Query) -> Result<TablePage> {
        let request = query.build(&self.binding)?;
        tracing::debug!(
            table = %self.binding.table_name,
            key_condition = %request.key_condition_expression(),
            "query"
        );

        let page = self.store.query(&request).await?;
        let items = page
            .items
            .iter()
            .map(item_to_json)
            .collect::<Result<Vec<_>>>()?;
        let cursor = page
            .last_evaluated_key
            .as_ref()
            .and_then(|key| self.binding.key_of(key))
            .map(|key| Cursor::encode(&key));
        Ok(TablePage { items, cursor })
    }

    /// Every item matching `query`, fetched page by page as the stream is
    /// polled.
    pub fn query_all(&self, query: Query) -> Result<impl Stream<Item = Result<Value>> + Send> {
        let request = query.build(&self.binding)?;
        Ok(item_stream(Arc::clone(&self.store), request)
            .map(|item| item.and_then(|item| item_to_json(&item))))
    }

    /// Delete the item at `key`, returning it if it existed.
    pub async fn delete(&self, key: &Key) -> Result<Option<Value>> {
        tracing::debug!(table = %self.binding.table_name, %key, "delete");
        self.store
            .delete_item(&self.binding, key)
            .await?
            .as_ref()
            .map(item_to_json)
            .transpose()
    }

    /// Merge counters into the data stored at `key`.
    ///
    /// A missing item is written with the counters and a `timestamp` field,
    /// nested under `path` when given. An existing item has overlapping
    /// counters summed and new ones added. Returns the resulting data.
    ///
    /// The read and the write are separate calls, so concurrent
    /// accumulations on one key can lose increments.
    pub async fn accumulate(
        &self,
        key: &Key,
        counters: &Map<String, Value>,
        path: Option<&str>,
    ) -> Result<Value> {
        let current = self.store.get_item(&self.binding, key).await?;

        let Some(current) = current else {
            let mut data = counters.clone();
            data.insert(TIMESTAMP_FIELD.to_string(), Value::String(timestamp()));
            let data = match path {
                Some(path) => Map::from_iter([(path.to_string(), Value::Object(data))]),
                None => data,
            };
            tracing::debug!(table = %self.binding.table_name, %key, "accumulate: insert");
            self.put(key, &data).await?;
            return Ok(Value::Object(data));
        };

        let existing = match self.binding.data_of(&current) {
            Some(data) => item_to_json(data)?,
            None => Value::Object(Map::new()),
        };
        let existing = existing.as_object().cloned().unwrap_or_default();
        let merged = merge_counters(&existing, counters, path)?;
        tracing::debug!(
            table = %self.binding.table_name,
            %key,
            fields = merged.len(),
            "accumulate: update"
        );

        let updated = self.update(key, &merged).await?;
        Ok(updated
            .get(&self.binding.data_attribute)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }
}

fn first_non_number<'v>(map: &'v Map<String, Value>, prefix: &str) -> Option<(String, &'v Value)> {
    for (name, value) in map {
        let field = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match value {
            Value::Number(_) => {}
            Value::Object(inner) => {
                if let Some(found) = first_non_number(inner, &field) {
                    return Some(found);
                }
            }
            other => return Some((field, other)),
        }
    }
    None
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::InMemoryStore;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn setup() -> (InMemoryStore, Table) {
        let store = InMemoryStore::new();
        let table = Table::new(Arc::new(store.clone()), TableBinding::new("stats"));
        (store, table)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (_, table) = setup();
        let key = Key::new("USER#1", "PROFILE");
        table.put(&key, &object(json!({"name": "Kay"}))).await.unwrap();

        let item = table.get(&key).await.unwrap().unwrap();
        assert_eq!(item["pk"], json!("USER#1"));
        assert_eq!(item["data"], json!({"name": "Kay"}));
        assert!(item.get("created").is_some());

        let deleted = table.delete(&key).await.unwrap();
        assert_eq!(deleted, Some(item));
        assert_eq!(table.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_applies_data_shaper() {
        let (_, table) = setup();
        let table = table.with_data_shaper(|mut data| {
            data.remove("password");
            data.insert("kind".to_string(), json!("user"));
            data
        });
        let key = Key::new("USER#1", "PROFILE");
        let stored = table
            .put(&key, &object(json!({"name": "Kay", "password": "secret"})))
            .await
            .unwrap();
        assert_eq!(stored["data"], json!({"name": "Kay", "kind": "user"}));

        let item = table.get(&key).await.unwrap().unwrap();
        assert_eq!(item["data"], stored["data"]);
    }

    #[tokio::test]
    async fn test_update_keeps_sibling_fields() {
        let (_, table) = setup();
        let key = Key::new("USER#1", "PROFILE");
        table
            .put(&key, &object(json!({"name": "Kay", "address": {"city": "Lyon", "zip": "69001"}})))
            .await
            .unwrap();

        let updated = table
            .update(&key, &object(json!({"address": {"city": "Paris"}})))
            .await
            .unwrap();
        assert_eq!(
            updated["data"],
            json!({"name": "Kay", "address": {"city": "Paris", "zip": "69001"}})
        );
        assert!(updated.get("updatedAt").is_some());
    }

    #[tokio::test]
    async fn test_increment() {
        let (_, table) = setup();
        let key = Key::new("PAGE#home", "COUNTERS");
        table.put(&key, &object(json!({"views": 1}))).await.unwrap();

        let updated = table
            .increment(&key, &object(json!({"views": 2})))
            .await
            .unwrap();
        assert_eq!(updated["data"]["views"], json!(3));

        let err = table
            .increment(&key, &object(json!({"views": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_query_pages_and_streams() {
        let (_, table) = setup();
        for i in 0..3 {
            table
                .put(&Key::new("P", format!("ITEM#{i}")), &object(json!({"n": i})))
                .await
                .unwrap();
        }
        table
            .put(&Key::new("P", "OTHER"), &object(json!({"n": 9})))
            .await
            .unwrap();

        let page = table
            .query(Query::new().with_pk("P").sk_beginswith("ITEM#").limit(2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0]["sk"], json!("ITEM#2"));
        let cursor = page.cursor.unwrap();

        let rest = table
            .query(
                Query::new()
                    .with_pk("P")
                    .sk_beginswith("ITEM#")
                    .limit(2)
                    .start_after(cursor.decode().unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.cursor, None);

        let all: Vec<Value> = table
            .query_all(Query::new().with_pk("P").ascending(true).limit(1))
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
            .await;
        let sks: Vec<_> = all.iter().map(|item| item["sk"].clone()).collect();
        assert_eq!(sks, vec![json!("ITEM#0"), json!("ITEM#1"), json!("ITEM#2"), json!("OTHER")]);
    }

    #[tokio::test]
    async fn test_query_requires_partition_key() {
        let (store, table) = setup();
        let err = table.query(Query::new()).await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidArguments(_)));
        assert_eq!(store.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_accumulate_inserts_then_merges() {
        let (store, table) = setup();
        let key = Key::new("SITE#1", "STATS#2024-01-01");

        let first = table
            .accumulate(&key, &object(json!({"views": 1, "clicks": 2})), Some("web"))
            .await
            .unwrap();
        assert_eq!(first["web"]["views"], json!(1));
        assert!(first["web"].get(TIMESTAMP_FIELD).is_some());
        assert_eq!(store.calls().put_item(), 1);

        let second = table
            .accumulate(&key, &object(json!({"views": 2, "visitors": 1})), Some("web"))
            .await
            .unwrap();
        assert_eq!(second["web"]["views"], json!(3));
        assert_eq!(second["web"]["clicks"], json!(2));
        assert_eq!(second["web"]["visitors"], json!(1));
        assert_eq!(store.calls().update_item(), 1);

        let third = table
            .accumulate(&key, &object(json!({"views": 4})), Some("app"))
            .await
            .unwrap();
        assert_eq!(third["app"], json!({"views": 4}));
        assert_eq!(third["web"]["views"], json!(3));
    }

    #[tokio::test]
    async fn test_accumulate_rejects_shape_change() {
        let (_, table) = setup();
        let key = Key::new("SITE#1", "STATS");
        table
            .accumulate(&key, &object(json!({"web": {"views": 1}})), None)
            .await
            .unwrap();

        let err = table
            .accumulate(&key, &object(json!({"web": 1})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
    }
}
