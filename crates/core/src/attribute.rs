//! Native attribute values.
//!
//! [`Attribute`] mirrors the value shapes the store understands. Numbers are
//! kept as decimal strings, like the store does on the wire, so converting
//! back and forth never loses precision.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::error::{ModelError, Result};

/// A single stored attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    S(String),
    N(String),
    Bool(bool),
    Null,
    L(Vec<Attribute>),
    M(HashMap<String, Attribute>),
}

/// A stored item: attribute name to value.
pub type Item = HashMap<String, Attribute>;

impl Attribute {
    /// Shorthand for a string attribute.
    pub fn s(value: impl Into<String>) -> Self {
        Attribute::S(value.into())
    }

    /// Shorthand for a numeric attribute.
    pub fn n(value: impl ToString) -> Self {
        Attribute::N(value.to_string())
    }

    pub fn as_s(&self) -> Option<&str> {
        match self {
            Attribute::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_m(&self) -> Option<&HashMap<String, Attribute>> {
        match self {
            Attribute::M(m) => Some(m),
            _ => None,
        }
    }

    /// Short name of the attribute shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Attribute::S(_) => "string",
            Attribute::N(_) => "number",
            Attribute::Bool(_) => "boolean",
            Attribute::Null => "null",
            Attribute::L(_) => "list",
            Attribute::M(_) => "map",
        }
    }

    /// Untyped conversion from a JSON value.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Attribute::Null,
            Value::Bool(b) => Attribute::Bool(*b),
            Value::Number(n) => Attribute::N(n.to_string()),
            Value::String(s) => Attribute::S(s.clone()),
            Value::Array(values) => Attribute::L(values.iter().map(Attribute::from_json).collect()),
            Value::Object(map) => Attribute::M(
                map.iter()
                    .map(|(k, v)| (k.clone(), Attribute::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Untyped conversion back to JSON.
    pub fn to_json(&self) -> Result<Value> {
        Ok(match self {
            Attribute::Null => Value::Null,
            Attribute::Bool(b) => Value::Bool(*b),
            Attribute::N(n) => Value::Number(parse_number(n)?),
            Attribute::S(s) => Value::String(s.clone()),
            Attribute::L(values) => Value::Array(
                values
                    .iter()
                    .map(Attribute::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Attribute::M(map) => {
                let mut object = Map::new();
                for (k, v) in map {
                    object.insert(k.clone(), v.to_json()?);
                }
                Value::Object(object)
            }
        })
    }
}

/// Parse a stored decimal string into a JSON number.
pub fn parse_number(raw: &str) -> Result<Number> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(Number::from(u));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| ModelError::Serialization(format!("Invalid number: {raw}")))
}

/// Short name of a JSON value shape, used in error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
