//! Declared record fields.

use serde_json::{Map, Value};

/// Name of the identifier field every schema carries.
pub const ID_FIELD: &str = "id";

/// Semantic type of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Text,
    Number,
    Bool,
    /// RFC 3339 timestamp, stored as a string.
    Timestamp,
    /// Free-form nested map; values are converted without a declaration.
    Map,
    List(Box<FieldType>),
    /// Nested structure with its own declared fields.
    Object(Schema),
}

impl FieldType {
    pub fn list_of(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    /// Human-readable name used in type mismatch errors.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "string",
            FieldType::Number => "number",
            FieldType::Bool => "boolean",
            FieldType::Timestamp => "timestamp",
            FieldType::Map | FieldType::Object(_) => "map",
            FieldType::List(_) => "list",
        }
    }

    /// Value used when a defaulted field is absent from storage.
    ///
    /// Timestamps have no sensible default.
    pub fn default_value(&self) -> Option<Value> {
        match self {
            FieldType::Text => Some(Value::String(String::new())),
            FieldType::Number => Some(Value::from(0)),
            FieldType::Bool => Some(Value::Bool(false)),
            FieldType::Timestamp => None,
            FieldType::Map | FieldType::Object(_) => Some(Value::Object(Map::new())),
            FieldType::List(_) => Some(Value::Array(Vec::new())),
        }
    }
}

/// Whether a field must be present.
#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    Required,
    Optional,
    Default(Value),
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub presence: Presence,
}

impl FieldDef {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            presence: Presence::Required,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            presence: Presence::Optional,
        }
    }

    /// Field that falls back to its type's default when absent.
    ///
    /// Types without a default (timestamps) become optional.
    pub fn defaulted(name: impl Into<String>, field_type: FieldType) -> Self {
        let presence = match field_type.default_value() {
            Some(value) => Presence::Default(value),
            None => Presence::Optional,
        };
        Self {
            name: name.into(),
            field_type,
            presence,
        }
    }

    /// Field with an explicit default value.
    pub fn with_default(name: impl Into<String>, field_type: FieldType, value: Value) -> Self {
        Self {
            name: name.into(),
            field_type,
            presence: Presence::Default(value),
        }
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }
}

/// An ordered set of declared fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// Schema for a top-level record: the declared fields plus `id`.
    pub fn for_record(fields: Vec<FieldDef>) -> Self {
        let mut schema = Self::new(fields);
        if schema.field(ID_FIELD).is_none() {
            schema
                .fields
                .insert(0, FieldDef::optional(ID_FIELD, FieldType::Text));
        }
        schema
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}
