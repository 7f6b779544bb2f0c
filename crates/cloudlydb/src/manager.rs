//! Per-model record manager.
//!
//! [`Items`] is the repository for one [`Model`] type. It resolves keys
//! through the model's key strategy, marshals fields through its schema and
//! hands the resulting request to the wrapped [`ItemStore`]. Key and filter
//! validation always happens before the store is contacted.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use serde_json::Value;

use cloudlydb_core::model::UPDATED_ATTRIBUTE;
use cloudlydb_core::update::REPLACE_MARKER;
use cloudlydb_core::{
    new_record_id, Args, Attribute, Cursor, ItemStore, Key, Model, ModelError, ModelMeta, Query,
    Result, SortCondition, StoreError, UpdateExpression, WriteCondition,
};

use crate::records::{item_stream, materialize, Page, Records};
use crate::table::DataShaper;

const ID_FIELD: &str = "id";

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Repository for records of type `M`.
///
/// Cheap to clone; clones share the store.
pub struct Items<M> {
    store: Arc<dyn ItemStore>,
    shaper: Option<DataShaper>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for Items<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            shaper: self.shaper.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Items<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Items").finish_non_exhaustive()
    }
}

impl<M: Model> Items<M> {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self {
            store,
            shaper: None,
            _model: PhantomData,
        }
    }

    /// Reshape the fields of every [`Items::create`] before keys are
    /// resolved and the record is validated.
    pub fn with_data_shaper<F>(mut self, shaper: F) -> Self
    where
        F: Fn(serde_json::Map<String, Value>) -> serde_json::Map<String, Value>
            + Send
            + Sync
            + 'static,
    {
        self.shaper = Some(Arc::new(shaper));
        self
    }

    pub fn meta(&self) -> &'static ModelMeta {
        M::meta()
    }

    /// Point read by key arguments.
    pub async fn get(&self, keys: &Args) -> Result<M> {
        let meta = M::meta();
        let key = meta.keys().keys_for_create(keys)?;
        tracing::debug!(model = %meta.name(), pk = %key.pk, sk = %key.sk, "get");

        let item = self
            .store
            .get_item(meta.table(), &key)
            .await?
            .ok_or_else(|| not_found(meta, &key))?;
        materialize(&item)
    }

    /// Every record matching `filters`.
    ///
    /// Filters name key attributes or key-template fields; see
    /// [`QueryTranslator`](cloudlydb_core::QueryTranslator). Empty filters
    /// list the model's default partition. Records are fetched page by page
    /// as the returned stream is polled.
    pub fn all(&self, filters: &Args) -> Result<Records<M>> {
        self.all_query(self.query_for(filters)?)
    }

    /// Like [`Items::all`], keeping only records accepted by `predicate`.
    pub fn all_where<F>(&self, filters: &Args, predicate: F) -> Result<Records<M>>
    where
        F: FnMut(&M) -> bool + Send + 'static,
    {
        Ok(self.all(filters)?.filter(predicate))
    }

    /// Every record matching a hand-built query.
    pub fn all_query(&self, query: Query) -> Result<Records<M>> {
        let request = query.build(M::meta().table())?;
        tracing::debug!(
            model = %M::meta().name(),
            pk = %request.pk,
            key_condition = %request.key_condition_expression(),
            "all"
        );
        Ok(Records::new(Arc::clone(&self.store), request))
    }

    /// A single page of at most `limit` records, resuming after `cursor`.
    pub async fn page(&self, filters: &Args, cursor: Option<&Cursor>, limit: usize) -> Result<Page<M>> {
        let meta = M::meta();
        let mut query = self.query_for(filters)?.limit(limit);
        if let Some(cursor) = cursor {
            query = query.start_after(cursor.decode()?);
        }
        let request = query.build(meta.table())?;

        let page = self.store.query(&request).await?;
        let records = page
            .items
            .iter()
            .map(materialize)
            .collect::<Result<Vec<M>>>()?;
        let cursor = page
            .last_evaluated_key
            .as_ref()
            .and_then(|key| meta.table().key_of(key))
            .map(|key| Cursor::encode(&key));

        tracing::debug!(
            model = %meta.name(),
            count = records.len(),
            more = cursor.is_some(),
            "page"
        );
        Ok(Page { records, cursor })
    }

    /// Insert a new record. A missing `id` is generated.
    ///
    /// Arguments starting with `_` are passed to the key strategy and never
    /// stored. Fails with [`ModelError::DuplicateRecord`] when an item
    /// already exists at the resolved key.
    pub async fn create(&self, fields: &Args) -> Result<M> {
        let meta = M::meta();
        let mut fields = fields.clone();
        if !fields.has(ID_FIELD) {
            fields.insert(ID_FIELD, new_record_id());
        }
        if let Some(shaper) = &self.shaper {
            fields = shaper(fields.to_object()).into_iter().collect();
        }

        let key = meta.keys().keys_for_create(&fields)?;
        let data = meta.marshaller().marshal(&Value::Object(fields.stored_fields()))?;
        let item = meta.table().new_item(&key, data, &timestamp());
        tracing::debug!(model = %meta.name(), pk = %key.pk, sk = %key.sk, "create");

        match self
            .store
            .put_item(meta.table(), item.clone(), Some(WriteCondition::NotExists))
            .await
        {
            Ok(()) => materialize(&item),
            Err(StoreError::ConditionFailed(_)) => Err(ModelError::DuplicateRecord {
                model: meta.name().to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a typed record. See [`Items::create`].
    pub async fn create_record(&self, record: &M) -> Result<M> {
        let fields = Args::from_json(serde_json::to_value(record)?)?;
        self.create(&fields).await
    }

    /// Partial update of an existing record.
    ///
    /// `fields` carries the key arguments plus the fields to change; each
    /// given field is replaced whole and null fields are ignored. Fails with
    /// [`ModelError::RecordNotFound`] when nothing is stored at the key.
    pub async fn update(&self, fields: &Args) -> Result<M> {
        let meta = M::meta();
        let key = meta.keys().keys_for_create(fields)?;

        let mut changes = fields.stored_fields();
        changes.remove(ID_FIELD);
        changes.retain(|_, value| !value.is_null());
        let data: HashMap<String, Attribute> = meta
            .marshaller()
            .marshal_partial(&changes)?
            .into_iter()
            .map(|(name, value)| (format!("{name}{REPLACE_MARKER}"), value))
            .collect();

        let mut item = HashMap::from([(UPDATED_ATTRIBUTE.to_string(), Attribute::s(timestamp()))]);
        if !data.is_empty() {
            item.insert(meta.table().data_attribute.clone(), Attribute::M(data));
        }
        tracing::debug!(model = %meta.name(), pk = %key.pk, sk = %key.sk, "update");

        match self
            .store
            .update_item(
                meta.table(),
                &key,
                &UpdateExpression::set(&item),
                Some(WriteCondition::Exists),
            )
            .await
        {
            Ok(updated) => materialize(&updated),
            Err(StoreError::ConditionFailed(_)) => Err(not_found(meta, &key)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the record at the key resolved from `keys`.
    ///
    /// Returns the number of records deleted; deleting a missing record is
    /// not an error.
    pub async fn delete(&self, keys: &Args) -> Result<usize> {
        let meta = M::meta();
        let key = meta.keys().keys_for_create(keys)?;
        tracing::debug!(model = %meta.name(), pk = %key.pk, sk = %key.sk, "delete");

        let deleted = self.store.delete_item(meta.table(), &key).await?;
        Ok(usize::from(deleted.is_some()))
    }

    /// Delete every record matching `filters`. Returns how many were
    /// deleted.
    pub async fn delete_all(&self, filters: &Args) -> Result<usize> {
        let meta = M::meta();
        let request = self.query_for(filters)?.build(meta.table())?;

        // Collect keys first so deletes do not race the paginated query.
        let mut keys: Vec<Key> = Vec::new();
        let mut items = Box::pin(item_stream(Arc::clone(&self.store), request));
        while let Some(item) = items.next().await {
            if let Some(key) = meta.table().key_of(&item?) {
                keys.push(key);
            }
        }

        let mut deleted = 0;
        for key in &keys {
            if self.store.delete_item(meta.table(), key).await?.is_some() {
                deleted += 1;
            }
        }
        tracing::debug!(model = %meta.name(), matched = keys.len(), deleted, "delete_all");
        Ok(deleted)
    }

    /// Persist a record.
    ///
    /// Without an id the record is created and the generated id written
    /// back. Otherwise the stored item is overwritten in full.
    pub async fn save(&self, record: &mut M) -> Result<()> {
        if record.id().is_none() {
            *record = self.create_record(record).await?;
            return Ok(());
        }

        let meta = M::meta();
        let fields = Args::from_json(serde_json::to_value(&*record)?)?;
        let key = meta.keys().keys_for_create(&fields)?;
        let data = meta.marshaller().marshal(&Value::Object(fields.stored_fields()))?;

        let now = timestamp();
        let mut item = meta.table().new_item(&key, data, &now);
        item.insert(UPDATED_ATTRIBUTE.to_string(), Attribute::s(now));
        tracing::debug!(model = %meta.name(), pk = %key.pk, sk = %key.sk, "save");

        self.store.put_item(meta.table(), item, None).await?;
        Ok(())
    }

    /// Delete a typed record. Returns whether it was stored.
    pub async fn remove(&self, record: &M) -> Result<bool> {
        let keys = Args::from_json(serde_json::to_value(record)?)?;
        Ok(self.delete(&keys).await? > 0)
    }

    fn query_for(&self, filters: &Args) -> Result<Query> {
        let meta = M::meta();
        let query = meta.translator().translate(filters)?;
        match meta.sk_prefix() {
            Some(prefix) if filters.is_empty() => {
                Ok(query.sort(SortCondition::BeginsWith(prefix.to_string())))
            }
            _ => Ok(query),
        }
    }
}

fn not_found(meta: &ModelMeta, key: &Key) -> ModelError {
    ModelError::RecordNotFound {
        model: meta.name().to_string(),
        key: key.to_string(),
    }
}
