//! A thin object mapper over DynamoDB.
//!
//! Declare a record type with a [`ModelMeta`], implement [`Model`] for it
//! and use [`Items`] to get, list, create, update and delete records. Every
//! operation validates keys and fields locally and then issues plain store
//! calls through an [`ItemStore`]; retries, batching and consistency are
//! left to the wrapped client.
//!
//! ```ignore
//! use std::sync::{Arc, LazyLock};
//! use cloudlydb::{Args, FieldDef, FieldType, Items, Model, ModelMeta, TableBinding};
//!
//! static STUDENT: LazyLock<ModelMeta> = LazyLock::new(|| {
//!     ModelMeta::builder("Student", module_path!())
//!         .table(TableBinding::from_env("SCHOOL_TABLE", "school"))
//!         .keys("STUDENT#{firstName}", "STUDENT#{id}")
//!         .field(FieldDef::required("firstName", FieldType::Text))
//!         .build()
//!         .expect("valid student metadata")
//! });
//!
//! let store = Arc::new(cloudlydb::storage::DynamoDbStore::from_env().await);
//! let students = Items::<Student>::new(store);
//! let jane = students.get(&Args::new().with("firstName", "Jane").with("id", "1")).await?;
//! ```

pub mod config;
pub mod manager;
pub mod records;
pub mod storage;
pub mod table;

pub use cloudlydb_core::{
    new_record_id, Args, Attribute, Cursor, CustomKeys, FieldDef, FieldType, Item, ItemStore, Key,
    KeyQuery, KeyStrategy, Model, ModelError, ModelMeta, Presence, Query, Result, Schema,
    SortCondition, SortKey, StoreError, TableBinding,
};

pub use config::StoreConfig;
pub use manager::Items;
pub use records::{Page, Records};
pub use table::{DataShaper, Table, TablePage};
