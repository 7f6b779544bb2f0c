//! DynamoDB attribute conversion functions.
//!
//! Pure functions for converting between DynamoDB `AttributeValue` maps and
//! the store-neutral [`Attribute`] model. These are testable in isolation
//! without DynamoDB access.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use cloudlydb_core::attribute::{Attribute, Item};
use cloudlydb_core::{Key, StoreError, TableBinding};

/// Convert an attribute to its SDK form.
pub fn to_attribute_value(attribute: &Attribute) -> AttributeValue {
    match attribute {
        Attribute::S(s) => AttributeValue::S(s.clone()),
        Attribute::N(n) => AttributeValue::N(n.clone()),
        Attribute::Bool(b) => AttributeValue::Bool(*b),
        Attribute::Null => AttributeValue::Null(true),
        Attribute::L(values) => AttributeValue::L(values.iter().map(to_attribute_value).collect()),
        Attribute::M(map) => AttributeValue::M(to_attribute_map(map)),
    }
}

/// Convert an SDK attribute value.
///
/// String and number sets become lists. Binary values are not supported.
pub fn from_attribute_value(value: &AttributeValue) -> Result<Attribute, StoreError> {
    Ok(match value {
        AttributeValue::S(s) => Attribute::S(s.clone()),
        AttributeValue::N(n) => Attribute::N(n.clone()),
        AttributeValue::Bool(b) => Attribute::Bool(*b),
        AttributeValue::Null(_) => Attribute::Null,
        AttributeValue::L(values) => Attribute::L(
            values
                .iter()
                .map(from_attribute_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        AttributeValue::M(map) => Attribute::M(from_attribute_map(map)?),
        AttributeValue::Ss(values) => {
            Attribute::L(values.iter().map(|s| Attribute::S(s.clone())).collect())
        }
        AttributeValue::Ns(values) => {
            Attribute::L(values.iter().map(|n| Attribute::N(n.clone())).collect())
        }
        other => {
            return Err(StoreError::Service(format!(
                "Unsupported attribute type: {other:?}"
            )))
        }
    })
}

/// Convert an item to a DynamoDB attribute map.
pub fn to_attribute_map(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(k, v)| (k.clone(), to_attribute_value(v)))
        .collect()
}

/// Convert a DynamoDB attribute map to an item.
pub fn from_attribute_map(map: &HashMap<String, AttributeValue>) -> Result<Item, StoreError> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), from_attribute_value(v)?)))
        .collect()
}

/// Key attributes for a point operation.
pub fn key_attributes(table: &TableBinding, key: &Key) -> HashMap<String, AttributeValue> {
    to_attribute_map(&table.key_item(key))
}
