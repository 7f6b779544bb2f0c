//! Update expressions and counter merging.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::attribute::{json_kind, Attribute, Item};
use crate::error::{ModelError, Result};

/// Suffix on a field name that makes a `SET` replace the whole value instead
/// of descending into it.
pub const REPLACE_MARKER: &str = ":$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    Set,
    Add,
}

/// One `path = value` (or `path value` for `ADD`) clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub path: Vec<String>,
    pub value: Attribute,
}

/// A structured `SET` or `ADD` update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    pub action: UpdateAction,
    pub assignments: Vec<Assignment>,
}

/// An update rendered to expression syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedUpdate {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, Attribute>,
}

impl UpdateExpression {
    /// Nested `SET` over the given attributes.
    ///
    /// Non-empty maps are descended into so sibling fields are kept. A map
    /// under a name ending in [`REPLACE_MARKER`] is assigned as a whole,
    /// which is required when the map does not exist yet.
    pub fn set(item: &Item) -> Self {
        let mut assignments = Vec::new();
        collect_set(item, &mut Vec::new(), &mut assignments);
        Self {
            action: UpdateAction::Set,
            assignments,
        }
    }

    /// Numeric `ADD` over every leaf of the given attributes.
    pub fn add(item: &Item) -> Self {
        let mut assignments = Vec::new();
        collect_add(item, &mut Vec::new(), &mut assignments);
        Self {
            action: UpdateAction::Add,
            assignments,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Render with `#nN` name and `:vN` value placeholders.
    pub fn render(&self) -> RenderedUpdate {
        let mut names: HashMap<String, String> = HashMap::new();
        let mut placeholders: HashMap<String, String> = HashMap::new();
        let mut values = HashMap::new();
        let mut clauses = Vec::with_capacity(self.assignments.len());

        for (i, assignment) in self.assignments.iter().enumerate() {
            let path: Vec<String> = assignment
                .path
                .iter()
                .map(|segment| {
                    placeholders
                        .entry(segment.clone())
                        .or_insert_with(|| {
                            let placeholder = format!("#n{}", names.len());
                            names.insert(placeholder.clone(), segment.clone());
                            placeholder
                        })
                        .clone()
                })
                .collect();
            let value = format!(":v{i}");
            values.insert(value.clone(), assignment.value.clone());

            let path = path.join(".");
            clauses.push(match self.action {
                UpdateAction::Set => format!("{path} = {value}"),
                UpdateAction::Add => format!("{path} {value}"),
            });
        }

        let keyword = match self.action {
            UpdateAction::Set => "SET",
            UpdateAction::Add => "ADD",
        };

        RenderedUpdate {
            expression: format!("{keyword} {}", clauses.join(", ")),
            names,
            values,
        }
    }
}

fn sorted(map: &HashMap<String, Attribute>) -> Vec<(&String, &Attribute)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn collect_set(map: &HashMap<String, Attribute>, parent: &mut Vec<String>, out: &mut Vec<Assignment>) {
    for (name, value) in sorted(map) {
        let (name, replace) = match name.strip_suffix(REPLACE_MARKER) {
            Some(clean) => (clean, true),
            None => (name.as_str(), false),
        };
        parent.push(name.to_string());
        match value {
            Attribute::M(inner) if !replace && !inner.is_empty() => {
                collect_set(inner, parent, out);
            }
            value => out.push(Assignment {
                path: parent.clone(),
                value: value.clone(),
            }),
        }
        parent.pop();
    }
}

fn collect_add(map: &HashMap<String, Attribute>, parent: &mut Vec<String>, out: &mut Vec<Assignment>) {
    for (name, value) in sorted(map) {
        parent.push(name.clone());
        match value {
            Attribute::M(inner) => collect_add(inner, parent, out),
            value => out.push(Assignment {
                path: parent.clone(),
                value: value.clone(),
            }),
        }
        parent.pop();
    }
}

/// Merge a counter delta into the counters already stored.
///
/// Numbers present on both sides are summed; keys only in `delta` are kept
/// as given; nested maps are merged recursively. Nested maps missing from
/// `original` are returned under a [`REPLACE_MARKER`] name so a `SET` creates
/// them whole. Keys only in `original` are left out: they are untouched by
/// the resulting update. With `path`, the delta is nested under that key.
pub fn merge_counters(
    original: &Map<String, Value>,
    delta: &Map<String, Value>,
    path: Option<&str>,
) -> Result<Map<String, Value>> {
    let delta = match path {
        Some(path) => Map::from_iter([(path.to_string(), Value::Object(delta.clone()))]),
        None => delta.clone(),
    };
    if original.is_empty() {
        return Ok(delta);
    }
    merge_level(original, &delta, "")
}

fn merge_level(
    original: &Map<String, Value>,
    delta: &Map<String, Value>,
    prefix: &str,
) -> Result<Map<String, Value>> {
    let mut merged = Map::new();
    for (key, value) in delta {
        let field = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match (original.get(key), value) {
            (None, Value::Object(_)) => {
                merged.insert(format!("{key}{REPLACE_MARKER}"), value.clone());
            }
            (None, _) => {
                merged.insert(key.clone(), value.clone());
            }
            (Some(Value::Object(current)), Value::Object(inner)) => {
                // An empty map would be assigned whole and wipe the stored one.
                let inner = merge_level(current, inner, &field)?;
                if !inner.is_empty() {
                    merged.insert(key.clone(), Value::Object(inner));
                }
            }
            (Some(Value::Number(current)), Value::Number(added)) => {
                merged.insert(key.clone(), Value::Number(sum(&field, current, added)?));
            }
            (Some(current), value) => {
                return Err(ModelError::TypeMismatch {
                    field,
                    expected: json_kind(current),
                    actual: json_kind(value),
                })
            }
        }
    }
    Ok(merged)
}

fn sum(field: &str, a: &Number, b: &Number) -> Result<Number> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(total) = a.checked_add(b) {
            return Ok(Number::from(total));
        }
    }
    let total = a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default();
    Number::from_f64(total)
        .ok_or_else(|| ModelError::Serialization(format!("'{field}' sum is not a finite number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn item(value: Value) -> Item {
        object(value)
            .iter()
            .map(|(k, v)| (k.clone(), Attribute::from_json(v)))
            .collect()
    }

    #[test]
    fn test_set_flat_fields() {
        let update = UpdateExpression::set(&item(json!({"name": "Jane", "age": 3})));
        let rendered = update.render();
        assert_eq!(rendered.expression, "SET #n0 = :v0, #n1 = :v1");
        assert_eq!(rendered.names.get("#n0").map(String::as_str), Some("age"));
        assert_eq!(rendered.values.get(":v1"), Some(&Attribute::s("Jane")));
    }

    #[test]
    fn test_set_descends_into_maps() {
        let update = UpdateExpression::set(&item(json!({
            "data": {"name": "Jane", "address": {"city": "Paris"}},
            "updatedAt": "2024-01-01T00:00:00Z"
        })));
        let paths: Vec<String> = update
            .assignments
            .iter()
            .map(|a| a.path.join("."))
            .collect();
        assert_eq!(paths, vec!["data.address.city", "data.name", "updatedAt"]);

        let rendered = update.render();
        assert_eq!(
            rendered.expression,
            "SET #n0.#n1.#n2 = :v0, #n0.#n3 = :v1, #n4 = :v2"
        );
        assert_eq!(rendered.names.len(), 5);
    }

    #[test]
    fn test_set_replace_marker_assigns_whole_map() {
        let update = UpdateExpression::set(&item(json!({
            "data": {"stats:$": {"views": 1}}
        })));
        assert_eq!(update.assignments.len(), 1);
        assert_eq!(update.assignments[0].path, vec!["data", "stats"]);
        assert!(matches!(update.assignments[0].value, Attribute::M(_)));
    }

    #[test]
    fn test_set_empty_map_is_assigned() {
        let update = UpdateExpression::set(&item(json!({"data": {"tags": {}}})));
        assert_eq!(update.assignments[0].path, vec!["data", "tags"]);
    }

    #[test]
    fn test_add_expression() {
        let update = UpdateExpression::add(&item(json!({"data": {"views": 2}})));
        assert_eq!(update.render().expression, "ADD #n0.#n1 :v0");
    }

    #[test]
    fn test_merge_sums_overlapping_counters() {
        let merged = merge_counters(
            &object(json!({"a": 1, "b": 2})),
            &object(json!({"a": 2, "c": 3})),
            None,
        )
        .unwrap();
        assert_eq!(Value::Object(merged), json!({"a": 3, "c": 3}));
    }

    #[test]
    fn test_merge_with_path() {
        let merged = merge_counters(
            &object(json!({"stats": {"a": 1, "b": 2}})),
            &object(json!({"a": 2, "c": 3})),
            Some("stats"),
        )
        .unwrap();
        assert_eq!(Value::Object(merged), json!({"stats": {"a": 3, "c": 3}}));
    }

    #[test]
    fn test_merge_nested_and_new_maps() {
        let merged = merge_counters(
            &object(json!({"web": {"views": 10, "clicks": {"home": 1}}})),
            &object(json!({
                "web": {"views": 1.5, "clicks": {"home": 2, "about": 1}},
                "app": {"views": 4}
            })),
            None,
        )
        .unwrap();
        assert_eq!(
            Value::Object(merged),
            json!({
                "web": {"views": 11.5, "clicks": {"home": 3, "about": 1}},
                "app:$": {"views": 4}
            })
        );
    }

    #[test]
    fn test_merge_into_empty_original_returns_delta() {
        let merged = merge_counters(&Map::new(), &object(json!({"a": 1})), Some("s")).unwrap();
        assert_eq!(Value::Object(merged), json!({"s": {"a": 1}}));
    }

    #[test]
    fn test_merge_drops_empty_nested_deltas() {
        let merged = merge_counters(
            &object(json!({"stats": {"a": 1}})),
            &object(json!({"stats": {}, "b": 1})),
            None,
        )
        .unwrap();
        assert_eq!(Value::Object(merged), json!({"b": 1}));
    }

    #[test]
    fn test_merge_rejects_shape_changes() {
        let err = merge_counters(
            &object(json!({"a": {"x": 1}})),
            &object(json!({"a": 1})),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::TypeMismatch {
                field: "a".to_string(),
                expected: "map",
                actual: "number"
            }
        );
    }
}
