//! In-memory item store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Number;
use tokio::sync::RwLock;

use cloudlydb_core::attribute::{parse_number, Attribute, Item};
use cloudlydb_core::store::{ItemStore, QueryPage, StoreError, WriteCondition};
use cloudlydb_core::{Key, QueryRequest, TableBinding, UpdateAction, UpdateExpression};

/// Items of one table, ordered by partition then sort key.
type TableItems = BTreeMap<(String, String), Item>;

/// Number of requests each operation received.
#[derive(Debug, Default)]
pub struct CallCounts {
    get_item: AtomicUsize,
    put_item: AtomicUsize,
    update_item: AtomicUsize,
    query: AtomicUsize,
    delete_item: AtomicUsize,
}

impl CallCounts {
    pub fn get_item(&self) -> usize {
        self.get_item.load(Ordering::SeqCst)
    }

    pub fn put_item(&self) -> usize {
        self.put_item.load(Ordering::SeqCst)
    }

    pub fn update_item(&self) -> usize {
        self.update_item.load(Ordering::SeqCst)
    }

    pub fn query(&self) -> usize {
        self.query.load(Ordering::SeqCst)
    }

    pub fn delete_item(&self) -> usize {
        self.delete_item.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.get_item() + self.put_item() + self.update_item() + self.query() + self.delete_item()
    }
}

/// In-memory storage backend for testing.
///
/// Tables are created on first write and live in `Arc<RwLock<_>>`, so
/// clones share the same data. Queries are evaluated directly from the
/// request's key conditions, including index queries over any attribute
/// pair, ordering, limits, exclusive start keys and projections.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, TableItems>>>,
    calls: Arc<CallCounts>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-operation request counters.
    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Number of items stored in a table.
    pub async fn len(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self, table: &str) -> bool {
        self.len(table).await == 0
    }

    /// All items of a table in key order.
    pub async fn items(&self, table: &str) -> Vec<Item> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn base_key(key: &Key) -> (String, String) {
    (key.pk.clone(), key.sk.clone())
}

fn check_condition(
    condition: Option<WriteCondition>,
    exists: bool,
    key: &Key,
) -> Result<(), StoreError> {
    match (condition, exists) {
        (Some(WriteCondition::NotExists), true) => Err(StoreError::ConditionFailed(format!(
            "item {key} already exists"
        ))),
        (Some(WriteCondition::Exists), false) => Err(StoreError::ConditionFailed(format!(
            "item {key} does not exist"
        ))),
        _ => Ok(()),
    }
}

fn invalid_path(path: &[String]) -> StoreError {
    StoreError::Validation(format!(
        "The document path '{}' is invalid for update",
        path.join(".")
    ))
}

fn add_numbers(current: &str, delta: &str) -> Result<String, StoreError> {
    let parse = |raw: &str| parse_number(raw).map_err(|e| StoreError::Validation(e.to_string()));
    let (a, b) = (parse(current)?, parse(delta)?);
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(total) = a.checked_add(b) {
            return Ok(total.to_string());
        }
    }
    let total = a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default();
    Number::from_f64(total)
        .map(|n| n.to_string())
        .ok_or_else(|| StoreError::Validation("ADD result is not a finite number".to_string()))
}

/// Apply a structured update in place.
fn apply_update(item: &mut Item, update: &UpdateExpression) -> Result<(), StoreError> {
    for assignment in &update.assignments {
        let (last, parents) = assignment
            .path
            .split_last()
            .ok_or_else(|| StoreError::Validation("empty update path".to_string()))?;

        let mut target: &mut HashMap<String, Attribute> = item;
        for segment in parents {
            target = match target.get_mut(segment) {
                Some(Attribute::M(map)) => map,
                _ => return Err(invalid_path(&assignment.path)),
            };
        }

        let value = match update.action {
            UpdateAction::Set => assignment.value.clone(),
            UpdateAction::Add => match (target.get(last), &assignment.value) {
                (None, value @ Attribute::N(_)) => value.clone(),
                (Some(Attribute::N(current)), Attribute::N(delta)) => {
                    Attribute::N(add_numbers(current, delta)?)
                }
                _ => {
                    return Err(StoreError::Validation(format!(
                        "ADD on '{}' requires numeric operands",
                        assignment.path.join(".")
                    )))
                }
            },
        };
        target.insert(last.clone(), value);
    }
    Ok(())
}

fn copy_path(source: &HashMap<String, Attribute>, target: &mut HashMap<String, Attribute>, path: &[&str]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let Some(value) = source.get(*first) else {
        return;
    };
    if rest.is_empty() {
        target.insert(first.to_string(), value.clone());
        return;
    }
    if let Attribute::M(inner) = value {
        let entry = target
            .entry(first.to_string())
            .or_insert_with(|| Attribute::M(HashMap::new()));
        if let Attribute::M(out) = entry {
            copy_path(inner, out, rest);
        }
    }
}

fn project(item: &Item, paths: &[String]) -> Item {
    let mut out = Item::new();
    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        copy_path(item, &mut out, &segments);
    }
    out
}

/// Evaluate a query against one table's items.
fn evaluate(items: &TableItems, request: &QueryRequest) -> QueryPage {
    let mut matches: Vec<(String, &(String, String), &Item)> = items
        .iter()
        .filter_map(|(base, item)| {
            let pk = item.get(&request.pk_name)?.as_s()?;
            if pk != request.pk {
                return None;
            }
            let sk = item.get(&request.sk_name).and_then(Attribute::as_s);
            match (&request.sk, sk) {
                (Some(condition), Some(sk)) if condition.matches(sk) => {}
                (Some(_), _) => return None,
                // Index entries need both key attributes.
                (None, None) if request.index_name.is_some() => return None,
                (None, _) => {}
            }
            Some((sk.unwrap_or_default().to_string(), base, item))
        })
        .collect();

    matches.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    if !request.scan_forward {
        matches.reverse();
    }

    if let Some(start) = &request.exclusive_start_key {
        let position = request.table.key_of(start).and_then(|key| {
            matches
                .iter()
                .position(|(_, base, _)| base.0 == key.pk && base.1 == key.sk)
        });
        match position {
            Some(position) => {
                matches.drain(..=position);
            }
            None => {
                if let Some(after) = start.get(&request.sk_name).and_then(Attribute::as_s) {
                    matches.retain(|(sort, _, _)| {
                        if request.scan_forward {
                            sort.as_str() > after
                        } else {
                            sort.as_str() < after
                        }
                    });
                }
            }
        }
    }

    let has_more = matches.len() > request.limit;
    matches.truncate(request.limit);

    let last_evaluated_key = if has_more {
        matches.last().map(|(_, (pk, sk), item)| {
            let mut key = request.table.key_item(&Key::new(pk.as_str(), sk.as_str()));
            for name in [&request.pk_name, &request.sk_name] {
                if let Some(value) = item.get(name) {
                    key.insert(name.clone(), value.clone());
                }
            }
            key
        })
    } else {
        None
    };

    let items = matches
        .into_iter()
        .map(|(_, _, item)| {
            if request.projection.is_empty() {
                item.clone()
            } else {
                project(item, &request.projection)
            }
        })
        .collect();

    QueryPage {
        items,
        last_evaluated_key,
    }
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn get_item(&self, table: &TableBinding, key: &Key) -> Result<Option<Item>, StoreError> {
        self.calls.get_item.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table.table_name)
            .and_then(|items| items.get(&base_key(key)))
            .cloned())
    }

    async fn put_item(
        &self,
        table: &TableBinding,
        item: Item,
        condition: Option<WriteCondition>,
    ) -> Result<(), StoreError> {
        self.calls.put_item.fetch_add(1, Ordering::SeqCst);
        let key = table.key_of(&item).ok_or_else(|| {
            StoreError::Validation(format!(
                "item is missing key attributes '{}' and '{}'",
                table.partition_key, table.sort_key
            ))
        })?;

        let mut tables = self.tables.write().await;
        let items = tables.entry(table.table_name.clone()).or_default();
        check_condition(condition, items.contains_key(&base_key(&key)), &key)?;
        items.insert(base_key(&key), item);
        Ok(())
    }

    async fn update_item(
        &self,
        table: &TableBinding,
        key: &Key,
        update: &UpdateExpression,
        condition: Option<WriteCondition>,
    ) -> Result<Item, StoreError> {
        self.calls.update_item.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().await;
        let items = tables.entry(table.table_name.clone()).or_default();
        let existing = items.get(&base_key(key));
        check_condition(condition, existing.is_some(), key)?;

        // Work on a copy so a failed update leaves the item untouched.
        let mut item = existing.cloned().unwrap_or_else(|| table.key_item(key));
        apply_update(&mut item, update)?;
        items.insert(base_key(key), item.clone());
        Ok(item)
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryPage, StoreError> {
        self.calls.query.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.read().await;
        Ok(tables
            .get(&request.table.table_name)
            .map(|items| evaluate(items, request))
            .unwrap_or_default())
    }

    async fn delete_item(&self, table: &TableBinding, key: &Key) -> Result<Option<Item>, StoreError> {
        self.calls.delete_item.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().await;
        Ok(tables
            .get_mut(&table.table_name)
            .and_then(|items| items.remove(&base_key(key))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudlydb_core::Query;

    fn binding() -> TableBinding {
        TableBinding::new("school")
    }

    fn item(pk: &str, sk: &str, name: &str) -> Item {
        let data = HashMap::from([("name".to_string(), Attribute::s(name))]);
        binding().new_item(&Key::new(pk, sk), data, "2024-01-01T00:00:00Z")
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (sk, name) in [("S#1", "a"), ("S#2", "b"), ("S#3", "c"), ("T#1", "t")] {
            store
                .put_item(&binding(), item("P", sk, name), None)
                .await
                .unwrap();
        }
        store
            .put_item(&binding(), item("Q", "S#1", "other"), None)
            .await
            .unwrap();
        store
    }

    fn sort_keys(page: &QueryPage) -> Vec<String> {
        page.items
            .iter()
            .map(|item| binding().key_of(item).unwrap().sk)
            .collect()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();
        let key = Key::new("P", "S#1");
        store
            .put_item(&binding(), item("P", "S#1", "a"), None)
            .await
            .unwrap();

        let found = store.get_item(&binding(), &key).await.unwrap().unwrap();
        assert_eq!(found, item("P", "S#1", "a"));
        assert!(store
            .get_item(&binding(), &Key::new("P", "S#9"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.calls().put_item(), 1);
        assert_eq!(store.calls().get_item(), 2);
    }

    #[tokio::test]
    async fn test_put_not_exists_condition() {
        let store = InMemoryStore::new();
        let condition = Some(WriteCondition::NotExists);
        store
            .put_item(&binding(), item("P", "S#1", "a"), condition)
            .await
            .unwrap();
        let err = store
            .put_item(&binding(), item("P", "S#1", "b"), condition)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed(_)));
        assert_eq!(store.items("school").await, vec![item("P", "S#1", "a")]);
    }

    #[tokio::test]
    async fn test_put_requires_key_attributes() {
        let store = InMemoryStore::new();
        let err = store
            .put_item(&binding(), Item::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_exists_condition_on_missing_item() {
        let store = InMemoryStore::new();
        let update = UpdateExpression::set(&HashMap::from([(
            "updatedAt".to_string(),
            Attribute::s("now"),
        )]));
        let err = store
            .update_item(
                &binding(),
                &Key::new("P", "S#1"),
                &update,
                Some(WriteCondition::Exists),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed(_)));
        assert!(store.is_empty("school").await);
    }

    #[tokio::test]
    async fn test_update_sets_nested_fields() {
        let store = seeded().await;
        let key = Key::new("P", "S#1");
        let update = UpdateExpression::set(&HashMap::from([(
            "data".to_string(),
            Attribute::M(HashMap::from([("age".to_string(), Attribute::n(7))])),
        )]));

        let updated = store
            .update_item(&binding(), &key, &update, Some(WriteCondition::Exists))
            .await
            .unwrap();
        let data = binding().data_of(&updated).unwrap().clone();
        assert_eq!(data.get("name"), Some(&Attribute::s("a")));
        assert_eq!(data.get("age"), Some(&Attribute::n(7)));
    }

    #[tokio::test]
    async fn test_update_invalid_path_leaves_item_untouched() {
        let store = seeded().await;
        let key = Key::new("P", "S#1");
        let update = UpdateExpression::set(&HashMap::from([(
            "stats".to_string(),
            Attribute::M(HashMap::from([("views".to_string(), Attribute::n(1))])),
        )]));

        let err = store
            .update_item(&binding(), &key, &update, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let stored = store.get_item(&binding(), &key).await.unwrap().unwrap();
        assert_eq!(stored, item("P", "S#1", "a"));
    }

    #[tokio::test]
    async fn test_update_add_numbers() {
        let store = InMemoryStore::new();
        let key = Key::new("P", "STATS");
        let delta = HashMap::from([("views".to_string(), Attribute::n(2))]);

        store
            .update_item(&binding(), &key, &UpdateExpression::add(&delta), None)
            .await
            .unwrap();
        let updated = store
            .update_item(&binding(), &key, &UpdateExpression::add(&delta), None)
            .await
            .unwrap();
        assert_eq!(updated.get("views"), Some(&Attribute::n(4)));
    }

    #[test]
    fn test_add_numbers_mixed() {
        assert_eq!(add_numbers("1", "2").unwrap(), "3");
        assert_eq!(add_numbers("1.5", "2").unwrap(), "3.5");
        assert!(add_numbers("x", "2").is_err());
    }

    #[tokio::test]
    async fn test_query_descending_by_default() {
        let store = seeded().await;
        let request = Query::new()
            .with_pk("P")
            .sk_beginswith("S#")
            .build(&binding())
            .unwrap();
        let page = store.query(&request).await.unwrap();
        assert_eq!(sort_keys(&page), vec!["S#3", "S#2", "S#1"]);
        assert!(page.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_query_ascending_partition_only() {
        let store = seeded().await;
        let request = Query::new()
            .with_pk("P")
            .ascending(true)
            .build(&binding())
            .unwrap();
        let page = store.query(&request).await.unwrap();
        assert_eq!(sort_keys(&page), vec!["S#1", "S#2", "S#3", "T#1"]);
    }

    #[tokio::test]
    async fn test_query_range_conditions() {
        let store = seeded().await;
        let between = Query::new()
            .with_pk("P")
            .ascending(true)
            .sk_between("S#2", "T#1")
            .build(&binding())
            .unwrap();
        let page = store.query(&between).await.unwrap();
        assert_eq!(sort_keys(&page), vec!["S#2", "S#3", "T#1"]);

        let lt = Query::new()
            .with_pk("P")
            .sk_lt("S#2")
            .build(&binding())
            .unwrap();
        let page = store.query(&lt).await.unwrap();
        assert_eq!(sort_keys(&page), vec!["S#1"]);
    }

    #[tokio::test]
    async fn test_query_pages_with_exclusive_start_key() {
        let store = seeded().await;
        let first = Query::new()
            .with_pk("P")
            .ascending(true)
            .limit(2)
            .build(&binding())
            .unwrap();
        let page = store.query(&first).await.unwrap();
        assert_eq!(sort_keys(&page), vec!["S#1", "S#2"]);

        let mut next = first.clone();
        next.exclusive_start_key = page.last_evaluated_key;
        let page = store.query(&next).await.unwrap();
        assert_eq!(sort_keys(&page), vec!["S#3", "T#1"]);
        assert!(page.last_evaluated_key.is_none());
        assert_eq!(store.calls().query(), 2);
    }

    #[tokio::test]
    async fn test_query_projection() {
        let store = seeded().await;
        let request = Query::new()
            .with_pk("Q")
            .only(["data.name"])
            .build(&binding())
            .unwrap();
        let page = store.query(&request).await.unwrap();
        let expected = HashMap::from([(
            "data".to_string(),
            Attribute::M(HashMap::from([("name".to_string(), Attribute::s("other"))])),
        )]);
        assert_eq!(page.items, vec![expected]);
    }

    #[tokio::test]
    async fn test_index_query_skips_items_without_index_keys() {
        let store = seeded().await;
        let mut indexed = item("P", "S#9", "indexed");
        indexed.insert("gsi1pk".to_string(), Attribute::s("EMAIL#x"));
        indexed.insert("gsi1sk".to_string(), Attribute::s("1"));
        store.put_item(&binding(), indexed, None).await.unwrap();

        let request = Query::new()
            .index("gsi1")
            .pk_name("gsi1pk")
            .sk_name("gsi1sk")
            .with_pk("EMAIL#x")
            .build(&binding())
            .unwrap();
        let page = store.query(&request).await.unwrap();
        assert_eq!(sort_keys(&page), vec!["S#9"]);
    }

    #[tokio::test]
    async fn test_query_unknown_table_is_empty() {
        let store = InMemoryStore::new();
        let request = Query::new()
            .with_pk("P")
            .build(&TableBinding::new("nope"))
            .unwrap();
        assert!(store.query(&request).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_delete_returns_old_item() {
        let store = seeded().await;
        let key = Key::new("P", "S#1");
        let old = store.delete_item(&binding(), &key).await.unwrap();
        assert_eq!(old, Some(item("P", "S#1", "a")));
        assert!(store.delete_item(&binding(), &key).await.unwrap().is_none());
        assert_eq!(store.len("school").await, 4);
        assert_eq!(store.calls().delete_item(), 2);
    }
}
