//! Functional core of the cloudlydb object mapper.
//!
//! Everything in this crate is pure: key construction, filter translation,
//! attribute marshalling, update-expression building and counter merging
//! run without touching a store. The [`store::ItemStore`] trait is the seam
//! the shell crate plugs concrete backends into.

pub mod args;
pub mod attribute;
pub mod cursor;
pub mod error;
pub mod keys;
pub mod marshal;
pub mod model;
pub mod query;
pub mod schema;
pub mod store;
pub mod update;

pub use args::{Args, PRIVATE_PREFIX};
pub use attribute::{Attribute, Item};
pub use cursor::Cursor;
pub use error::{ModelError, Result};
pub use keys::{
    new_record_id, CustomKeys, Key, KeyFactory, KeyQuery, KeyStrategy, KeyTemplate, SortKey,
    Template,
};
pub use marshal::Marshaller;
pub use model::{Model, ModelMeta, ModelMetaBuilder, TableBinding};
pub use query::{KeyFilter, Query, QueryRequest, QueryTranslator, SortCondition, DEFAULT_LIMIT};
pub use schema::{FieldDef, FieldType, Presence, Schema};
pub use store::{ItemStore, QueryPage, StoreError, WriteCondition};
pub use update::{merge_counters, UpdateAction, UpdateExpression};
