//! Attribute marshalling.
//!
//! Converts between a record's JSON form (what `serde` produces for a model)
//! and the store's native attribute map, driven by the declared [`Schema`].
//! These are pure functions, testable without a store.

use std::collections::HashMap;

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::attribute::{json_kind, parse_number, Attribute};
use crate::error::{ModelError, Result};
use crate::schema::{FieldType, Presence, Schema};

/// Schema-driven marshaller for one model.
#[derive(Debug, Clone, Copy)]
pub struct Marshaller<'a> {
    schema: &'a Schema,
    model: &'a str,
}

impl<'a> Marshaller<'a> {
    pub fn new(schema: &'a Schema, model: &'a str) -> Self {
        Self { schema, model }
    }

    /// Marshal a complete record. Required fields must be present.
    pub fn marshal(&self, record: &Value) -> Result<HashMap<String, Attribute>> {
        let object = self.as_object(record)?;
        self.check_unknown(object)?;
        marshal_object(self.schema, object, "", false)
    }

    /// Marshal a subset of fields for a partial update.
    pub fn marshal_partial(&self, fields: &Map<String, Value>) -> Result<HashMap<String, Attribute>> {
        self.check_unknown(fields)?;
        marshal_object(self.schema, fields, "", true)
    }

    /// Convert stored attributes back to the record's JSON form.
    pub fn unmarshal(&self, attributes: &HashMap<String, Attribute>) -> Result<Value> {
        unmarshal_object(self.schema, attributes, "").map(Value::Object)
    }

    fn as_object<'v>(&self, record: &'v Value) -> Result<&'v Map<String, Value>> {
        record.as_object().ok_or_else(|| {
            ModelError::Serialization(format!(
                "{} must serialize to a map, got {}",
                self.model,
                json_kind(record)
            ))
        })
    }

    fn check_unknown(&self, object: &Map<String, Value>) -> Result<()> {
        let unknown: Vec<String> = object
            .keys()
            .filter(|k| !self.schema.contains(k))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ModelError::UnknownField {
                model: self.model.to_string(),
                fields: unknown,
            })
        }
    }
}

fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn marshal_object(
    schema: &Schema,
    object: &Map<String, Value>,
    prefix: &str,
    partial: bool,
) -> Result<HashMap<String, Attribute>> {
    let mut item = HashMap::new();
    for field in schema.fields() {
        let path = field_path(prefix, &field.name);
        match object.get(&field.name) {
            Some(value) if !value.is_null() => {
                item.insert(field.name.clone(), to_attribute(&path, &field.field_type, value)?);
            }
            // Absent or null: never written as null. Full records store the
            // declared default so that unmarshal then marshal is stable.
            _ if partial => {}
            _ => match &field.presence {
                Presence::Required => {
                    return Err(ModelError::MissingRequiredField { field: path });
                }
                Presence::Default(default) if !default.is_null() => {
                    item.insert(
                        field.name.clone(),
                        to_attribute(&path, &field.field_type, default)?,
                    );
                }
                _ => {}
            },
        }
    }
    Ok(item)
}

fn mismatch(path: &str, expected: &FieldType, value: &Value) -> ModelError {
    ModelError::TypeMismatch {
        field: path.to_string(),
        expected: expected.name(),
        actual: json_kind(value),
    }
}

fn to_attribute(path: &str, field_type: &FieldType, value: &Value) -> Result<Attribute> {
    match (field_type, value) {
        (FieldType::Text, Value::String(s)) => Ok(Attribute::S(s.clone())),
        (FieldType::Number, Value::Number(n)) => Ok(Attribute::N(n.to_string())),
        (FieldType::Bool, Value::Bool(b)) => Ok(Attribute::Bool(*b)),
        (FieldType::Timestamp, Value::String(s)) => {
            DateTime::parse_from_rfc3339(s).map_err(|_| ModelError::TypeMismatch {
                field: path.to_string(),
                expected: "timestamp",
                actual: "string",
            })?;
            Ok(Attribute::S(s.clone()))
        }
        (FieldType::Map, Value::Object(_)) => Ok(Attribute::from_json(value)),
        (FieldType::List(inner), Value::Array(values)) => values
            .iter()
            .enumerate()
            .map(|(i, v)| to_attribute(&format!("{path}[{i}]"), inner, v))
            .collect::<Result<Vec<_>>>()
            .map(Attribute::L),
        (FieldType::Object(schema), Value::Object(object)) => {
            let unknown: Vec<String> = object
                .keys()
                .filter(|k| !schema.contains(k))
                .map(|k| field_path(path, k))
                .collect();
            if !unknown.is_empty() {
                return Err(ModelError::UnknownField {
                    model: path.to_string(),
                    fields: unknown,
                });
            }
            marshal_object(schema, object, path, false).map(Attribute::M)
        }
        (expected, value) => Err(mismatch(path, expected, value)),
    }
}

fn unmarshal_object(
    schema: &Schema,
    attributes: &HashMap<String, Attribute>,
    prefix: &str,
) -> Result<Map<String, Value>> {
    let mut object = Map::new();
    // Attributes without a declared field are skipped.
    for field in schema.fields() {
        let path = field_path(prefix, &field.name);
        match (attributes.get(&field.name), &field.presence) {
            (Some(Attribute::Null) | None, Presence::Default(default)) => {
                object.insert(field.name.clone(), default.clone());
            }
            (Some(Attribute::Null) | None, Presence::Required) => {
                return Err(ModelError::MissingRequiredField { field: path });
            }
            (Some(Attribute::Null), Presence::Optional) => {
                object.insert(field.name.clone(), Value::Null);
            }
            (None, Presence::Optional) => {}
            (Some(attr), _) => {
                object.insert(field.name.clone(), from_attribute(&path, &field.field_type, attr)?);
            }
        }
    }
    Ok(object)
}

fn from_attribute(path: &str, field_type: &FieldType, attr: &Attribute) -> Result<Value> {
    match (field_type, attr) {
        (FieldType::Text | FieldType::Timestamp, Attribute::S(s)) => Ok(Value::String(s.clone())),
        (FieldType::Number, Attribute::N(n)) => parse_number(n).map(Value::Number),
        (FieldType::Bool, Attribute::Bool(b)) => Ok(Value::Bool(*b)),
        (FieldType::Map, Attribute::M(_)) => attr.to_json(),
        (FieldType::List(inner), Attribute::L(values)) => values
            .iter()
            .enumerate()
            .map(|(i, v)| from_attribute(&format!("{path}[{i}]"), inner, v))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (FieldType::Object(schema), Attribute::M(map)) => {
            unmarshal_object(schema, map, path).map(Value::Object)
        }
        (expected, attr) => Err(ModelError::TypeMismatch {
            field: path.to_string(),
            expected: expected.name(),
            actual: attr.kind(),
        }),
    }
}
