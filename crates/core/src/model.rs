//! Per-model static metadata.
//!
//! A [`ModelMeta`] is built once per record type and shared read-only for
//! the life of the process. It binds the type to a table, declares its
//! fields and chooses its key strategy.

use std::collections::HashMap;
use std::env;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::attribute::{Attribute, Item};
use crate::error::{ModelError, Result};
use crate::keys::{Key, KeyFactory, KeyStrategy, KeyTemplate, Template};
use crate::marshal::Marshaller;
use crate::query::{QueryTranslator, DEFAULT_PARTITION_KEY, DEFAULT_SORT_KEY};
use crate::schema::{FieldDef, Schema};

/// Attribute holding the record's fields.
pub const DATA_ATTRIBUTE: &str = "data";
/// Attribute holding the creation timestamp.
pub const CREATED_ATTRIBUTE: &str = "created";
/// Attribute holding the last update timestamp.
pub const UPDATED_ATTRIBUTE: &str = "updatedAt";

/// Table a model is stored in, with its key attribute names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinding {
    pub table_name: String,
    pub partition_key: String,
    pub sort_key: String,
    pub data_attribute: String,
}

impl TableBinding {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            partition_key: DEFAULT_PARTITION_KEY.to_string(),
            sort_key: DEFAULT_SORT_KEY.to_string(),
            data_attribute: DATA_ATTRIBUTE.to_string(),
        }
    }

    /// Table name taken from an environment variable, or `default`.
    pub fn from_env(var: &str, default: &str) -> Self {
        Self::new(env::var(var).unwrap_or_else(|_| default.to_string()))
    }

    pub fn with_keys(mut self, partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        self.partition_key = partition_key.into();
        self.sort_key = sort_key.into();
        self
    }

    pub fn with_data_attribute(mut self, name: impl Into<String>) -> Self {
        self.data_attribute = name.into();
        self
    }

    /// Key attributes for a resolved key.
    pub fn key_item(&self, key: &Key) -> Item {
        HashMap::from([
            (self.partition_key.clone(), Attribute::S(key.pk.clone())),
            (self.sort_key.clone(), Attribute::S(key.sk.clone())),
        ])
    }

    /// Read the key back from a stored item.
    pub fn key_of(&self, item: &Item) -> Option<Key> {
        let pk = item.get(&self.partition_key)?.as_s()?;
        let sk = item.get(&self.sort_key)?.as_s()?;
        Some(Key::new(pk, sk))
    }

    /// The record fields of a stored item.
    pub fn data_of<'i>(&self, item: &'i Item) -> Option<&'i HashMap<String, Attribute>> {
        item.get(&self.data_attribute)?.as_m()
    }

    /// Assemble a stored item: key attributes, record data and creation
    /// timestamp.
    pub fn new_item(&self, key: &Key, data: HashMap<String, Attribute>, created: &str) -> Item {
        let mut item = self.key_item(key);
        item.insert(self.data_attribute.clone(), Attribute::M(data));
        item.insert(CREATED_ATTRIBUTE.to_string(), Attribute::s(created));
        item
    }
}

/// Static description of a record type.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    name: String,
    qualified_name: String,
    table: TableBinding,
    schema: Schema,
    keys: KeyFactory,
    sk_prefix: Option<String>,
}

impl ModelMeta {
    /// Start describing a type. Pass `module_path!()` as `module_path`.
    pub fn builder(name: &str, module_path: &str) -> ModelMetaBuilder {
        ModelMetaBuilder {
            name: name.to_string(),
            qualified_name: format!("{module_path}::{name}"),
            table: None,
            fields: Vec::new(),
            templates: None,
            strategy: None,
            sk_prefix: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn table(&self) -> &TableBinding {
        &self.table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn keys(&self) -> &KeyFactory {
        &self.keys
    }

    /// Sort-key prefix applied by unfiltered listings.
    pub fn sk_prefix(&self) -> Option<&str> {
        self.sk_prefix.as_deref()
    }

    pub fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(&self.schema, &self.name)
    }

    pub fn translator(&self) -> QueryTranslator<'_> {
        QueryTranslator::new(&self.table.partition_key, &self.table.sort_key, &self.keys)
    }
}

/// Builder for [`ModelMeta`].
pub struct ModelMetaBuilder {
    name: String,
    qualified_name: String,
    table: Option<TableBinding>,
    fields: Vec<FieldDef>,
    templates: Option<(String, String)>,
    strategy: Option<KeyFactory>,
    sk_prefix: Option<String>,
}

impl ModelMetaBuilder {
    pub fn table(mut self, table: TableBinding) -> Self {
        self.table = Some(table);
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Key templates, e.g. `("STUDENT#{firstName}", "STUDENT#{id}")`.
    pub fn keys(mut self, pk: &str, sk: &str) -> Self {
        self.templates = Some((pk.to_string(), sk.to_string()));
        self
    }

    /// Custom key strategy. Takes precedence over templates.
    pub fn key_strategy(mut self, strategy: impl KeyStrategy + 'static) -> Self {
        self.strategy = Some(KeyFactory::custom(strategy));
        self
    }

    /// Override the partition key of the default strategy.
    pub fn model_name(mut self, name: &str) -> Self {
        self.qualified_name = name.to_string();
        self
    }

    pub fn sk_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sk_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> Result<ModelMeta> {
        let table = self.table.ok_or_else(|| {
            ModelError::InvalidArguments(format!("{}: no table configured", self.name))
        })?;

        let keys = match (self.strategy, self.templates) {
            (Some(strategy), _) => strategy,
            (None, Some((pk, sk))) => KeyFactory::Template(KeyTemplate::new(
                &self.name,
                Template::parse(&pk)?,
                Template::parse(&sk)?,
            )),
            (None, None) => {
                KeyFactory::Template(KeyTemplate::default_for(&self.qualified_name, &self.name))
            }
        };

        Ok(ModelMeta {
            schema: Schema::for_record(self.fields),
            name: self.name,
            qualified_name: self.qualified_name,
            table,
            keys,
            sk_prefix: self.sk_prefix,
        })
    }
}

/// A record type the mapper can store.
///
/// Implementors are plain `serde` types whose serialized form matches the
/// declared fields of [`Model::meta`], including an optional `id`.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    fn meta() -> &'static ModelMeta;

    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: String);
}
