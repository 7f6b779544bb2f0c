//! Named call arguments.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::attribute::json_kind;
use crate::error::{ModelError, Result};

/// Prefix of arguments that are read by key strategies and never stored.
pub const PRIVATE_PREFIX: char = '_';

/// Named arguments passed to a keyed operation, a filter, or a write.
///
/// Values are JSON so they line up with what a model serializes to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(BTreeMap<String, Value>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// A non-null argument is present.
    pub fn has(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build arguments from a JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(ModelError::InvalidArguments(format!(
                "expected a map of arguments, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn to_object(&self) -> Map<String, Value> {
        self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// The arguments that are stored, dropping private ones.
    ///
    /// Names starting with [`PRIVATE_PREFIX`] reach key strategies but are
    /// never marshalled.
    pub fn stored_fields(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| !k.starts_with(PRIVATE_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Render an argument as a key segment.
    ///
    /// Returns `Ok(None)` when the argument is absent or null. Only scalar
    /// values can be part of a key.
    pub fn key_segment(&self, name: &str) -> Result<Option<String>> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(ModelError::InvalidArguments(format!(
                "'{name}' cannot be used in a key: {} values are not supported",
                json_kind(other)
            ))),
        }
    }
}

impl FromIterator<(String, Value)> for Args {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<Value> for Args {
    type Error = ModelError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(value)
    }
}

impl IntoIterator for Args {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
