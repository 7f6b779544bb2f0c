//! Key-condition queries.
//!
//! [`Query`] is a builder over a single partition with an optional sort-key
//! condition. It becomes a [`QueryRequest`] that backends either render to
//! the store's expression syntax or evaluate directly.
//! [`QueryTranslator`] turns keyword-style filters (`sk__beginswith`, …) into
//! a [`Query`].

use std::collections::HashMap;

use serde_json::Value;

use crate::args::Args;
use crate::attribute::{Attribute, Item};
use crate::error::{ModelError, Result};
use crate::keys::{Key, KeyFactory, SortKey};
use crate::model::TableBinding;

/// Page size used when a query does not set one.
pub const DEFAULT_LIMIT: usize = 25;

pub const DEFAULT_PARTITION_KEY: &str = "pk";
pub const DEFAULT_SORT_KEY: &str = "sk";

const FILTER_SEPARATOR: &str = "__";

/// Condition on the sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCondition {
    Eq(String),
    BeginsWith(String),
    Gt(String),
    Gte(String),
    Lt(String),
    Lte(String),
    Between(String, String),
}

impl SortCondition {
    /// Whether a stored sort-key value satisfies the condition.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            SortCondition::Eq(v) => value == v,
            SortCondition::BeginsWith(prefix) => value.starts_with(prefix.as_str()),
            SortCondition::Gt(v) => value > v.as_str(),
            SortCondition::Gte(v) => value >= v.as_str(),
            SortCondition::Lt(v) => value < v.as_str(),
            SortCondition::Lte(v) => value <= v.as_str(),
            SortCondition::Between(low, high) => value >= low.as_str() && value <= high.as_str(),
        }
    }

    fn render(&self, name: &str) -> String {
        match self {
            SortCondition::Eq(_) => format!("{name} = :sk"),
            SortCondition::BeginsWith(_) => format!("begins_with({name}, :sk)"),
            SortCondition::Gt(_) => format!("{name} > :sk"),
            SortCondition::Gte(_) => format!("{name} >= :sk"),
            SortCondition::Lt(_) => format!("{name} < :sk"),
            SortCondition::Lte(_) => format!("{name} <= :sk"),
            SortCondition::Between(_, _) => format!("{name} BETWEEN :sk1 AND :sk2"),
        }
    }

    fn values(&self) -> Vec<(&'static str, &str)> {
        match self {
            SortCondition::Between(low, high) => vec![(":sk1", low.as_str()), (":sk2", high.as_str())],
            SortCondition::Eq(v)
            | SortCondition::BeginsWith(v)
            | SortCondition::Gt(v)
            | SortCondition::Gte(v)
            | SortCondition::Lt(v)
            | SortCondition::Lte(v) => vec![(":sk", v.as_str())],
        }
    }
}

impl From<SortKey> for SortCondition {
    fn from(sk: SortKey) -> Self {
        match sk {
            SortKey::Exact(value) => SortCondition::Eq(value),
            SortKey::Prefix(prefix) => SortCondition::BeginsWith(prefix),
        }
    }
}

/// Query builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pk: Option<String>,
    pk_name: String,
    sk: Option<SortCondition>,
    sk_name: String,
    index: Option<String>,
    limit: usize,
    ascending: bool,
    projection: Vec<String>,
    start_after: Option<Key>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            pk: None,
            pk_name: DEFAULT_PARTITION_KEY.to_string(),
            sk: None,
            sk_name: DEFAULT_SORT_KEY.to_string(),
            index: None,
            limit: DEFAULT_LIMIT,
            ascending: false,
            projection: Vec::new(),
            start_after: None,
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pk(mut self, pk: impl Into<String>) -> Self {
        self.pk = Some(pk.into());
        self
    }

    /// Name of the partition-key attribute, for index queries.
    pub fn pk_name(mut self, name: impl Into<String>) -> Self {
        self.pk_name = name.into();
        self
    }

    pub fn sk_name(mut self, name: impl Into<String>) -> Self {
        self.sk_name = name.into();
        self
    }

    pub fn with_sk(self, sk: impl Into<String>) -> Self {
        self.sort(SortCondition::Eq(sk.into()))
    }

    pub fn sk_beginswith(self, prefix: impl Into<String>) -> Self {
        self.sort(SortCondition::BeginsWith(prefix.into()))
    }

    /// Sort key between `low` and `high`, both inclusive.
    pub fn sk_between(self, low: impl Into<String>, high: impl Into<String>) -> Self {
        self.sort(SortCondition::Between(low.into(), high.into()))
    }

    pub fn sk_gt(self, value: impl Into<String>) -> Self {
        self.sort(SortCondition::Gt(value.into()))
    }

    pub fn sk_gte(self, value: impl Into<String>) -> Self {
        self.sort(SortCondition::Gte(value.into()))
    }

    pub fn sk_lt(self, value: impl Into<String>) -> Self {
        self.sort(SortCondition::Lt(value.into()))
    }

    pub fn sk_lte(self, value: impl Into<String>) -> Self {
        self.sort(SortCondition::Lte(value.into()))
    }

    /// Replace the sort-key condition.
    pub fn sort(mut self, condition: SortCondition) -> Self {
        self.sk = Some(condition);
        self
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Return items in ascending sort-key order. Queries are descending
    /// unless this is set.
    pub fn ascending(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }

    /// Only return the given attribute paths (`data.name`, …).
    pub fn only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.projection.contains(&field) {
                self.projection.push(field);
            }
        }
        self
    }

    /// Resume after the given key.
    pub fn start_after(mut self, key: Key) -> Self {
        self.start_after = Some(key);
        self
    }

    pub fn partition(&self) -> Option<&str> {
        self.pk.as_deref()
    }

    pub fn sort_condition(&self) -> Option<&SortCondition> {
        self.sk.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.limit
    }

    /// Bind the query to a table. Fails when no partition key was set.
    pub fn build(self, table: &TableBinding) -> Result<QueryRequest> {
        let pk = self.pk.ok_or_else(|| {
            ModelError::InvalidArguments("query requires a partition key".to_string())
        })?;
        let exclusive_start_key = self.start_after.as_ref().map(|key| table.key_item(key));

        Ok(QueryRequest {
            table: table.clone(),
            index_name: self.index,
            pk_name: self.pk_name,
            pk,
            sk_name: self.sk_name,
            sk: self.sk,
            limit: self.limit,
            scan_forward: self.ascending,
            projection: self.projection,
            exclusive_start_key,
        })
    }
}

/// A query bound to a table, ready for a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table: TableBinding,
    pub index_name: Option<String>,
    pub pk_name: String,
    pub pk: String,
    pub sk_name: String,
    pub sk: Option<SortCondition>,
    pub limit: usize,
    pub scan_forward: bool,
    pub projection: Vec<String>,
    pub exclusive_start_key: Option<Item>,
}

impl QueryRequest {
    pub fn key_condition_expression(&self) -> String {
        let pk_expr = format!("{} = :pk", self.pk_name);
        match &self.sk {
            Some(condition) => format!("{pk_expr} AND {}", condition.render(&self.sk_name)),
            None => pk_expr,
        }
    }

    pub fn expression_attribute_values(&self) -> HashMap<String, Attribute> {
        let mut values = HashMap::from([(":pk".to_string(), Attribute::S(self.pk.clone()))]);
        if let Some(condition) = &self.sk {
            for (placeholder, value) in condition.values() {
                values.insert(placeholder.to_string(), Attribute::s(value));
            }
        }
        values
    }

    /// Projection expression with `#name` placeholders, if any.
    pub fn projection_expression(&self) -> Option<String> {
        if self.projection.is_empty() {
            return None;
        }
        let paths: Vec<String> = self
            .projection
            .iter()
            .map(|path| {
                path.split('.')
                    .map(|part| format!("#{part}"))
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .collect();
        Some(paths.join(", "))
    }

    pub fn expression_attribute_names(&self) -> HashMap<String, String> {
        self.projection
            .iter()
            .flat_map(|path| path.split('.'))
            .map(|part| (format!("#{part}"), part.to_string()))
            .collect()
    }
}

/// Filters split into key conditions and key-template arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFilter {
    pub pk: Option<String>,
    pub sk: Option<SortCondition>,
    pub template_args: Args,
}

/// Translates keyword filters into key conditions.
///
/// Accepted filter names are the partition and sort key attributes, with
/// the sort key taking `beginswith`, `gt`, `gte`, `lt`, `lte` and `between`
/// suffixes, plus the fields the key strategy reads, compared by equality.
#[derive(Debug, Clone, Copy)]
pub struct QueryTranslator<'a> {
    pk_name: &'a str,
    sk_name: &'a str,
    keys: &'a KeyFactory,
}

impl<'a> QueryTranslator<'a> {
    pub fn new(pk_name: &'a str, sk_name: &'a str, keys: &'a KeyFactory) -> Self {
        Self {
            pk_name,
            sk_name,
            keys,
        }
    }

    /// Validate and classify the filters without resolving keys.
    pub fn parse(&self, filters: &Args) -> Result<KeyFilter> {
        let key_fields = self.keys.key_fields();
        let mut out = KeyFilter::default();

        for (filter, value) in filters.iter() {
            let (name, suffix) = match filter.rsplit_once(FILTER_SEPARATOR) {
                Some((name, suffix)) => (name, Some(suffix)),
                None => (filter.as_str(), None),
            };
            let unsupported = |suffix: &str| ModelError::UnsupportedFilter {
                filter: filter.clone(),
                suffix: suffix.to_string(),
            };

            if name == self.pk_name {
                if let Some(suffix) = suffix {
                    return Err(unsupported(suffix));
                }
                out.pk = Some(segment(filter, value)?);
            } else if name == self.sk_name {
                let condition = match suffix {
                    None => SortCondition::Eq(segment(filter, value)?),
                    Some("beginswith") => SortCondition::BeginsWith(segment(filter, value)?),
                    Some("gt") => SortCondition::Gt(segment(filter, value)?),
                    Some("gte") => SortCondition::Gte(segment(filter, value)?),
                    Some("lt") => SortCondition::Lt(segment(filter, value)?),
                    Some("lte") => SortCondition::Lte(segment(filter, value)?),
                    Some("between") => between(filter, value)?,
                    Some(other) => return Err(unsupported(other)),
                };
                out.sk = Some(condition);
            } else if key_fields.iter().any(|f| f == name) {
                if let Some(suffix) = suffix {
                    return Err(unsupported(suffix));
                }
                out.template_args.insert(name, value.clone());
            } else {
                // Unknown suffixes are reported before unknown names.
                if let Some(suffix) = suffix {
                    if !is_known_suffix(suffix) {
                        return Err(unsupported(suffix));
                    }
                }
                return Err(ModelError::InvalidFilterField {
                    field: name.to_string(),
                });
            }
        }

        Ok(out)
    }

    /// Translate filters into a query over one partition.
    ///
    /// Without an explicit partition key, the key strategy resolves it from
    /// the template arguments. Without a sort-key filter or template sort
    /// key, the sort-key condition is omitted.
    pub fn translate(&self, filters: &Args) -> Result<Query> {
        let filter = self.parse(filters)?;

        // An explicit partition key leaves only the sort key to resolve.
        let (pk, template_sk) = match filter.pk {
            Some(pk) if filter.template_args.is_empty() => (pk, None),
            Some(pk) => (pk, self.keys.sort_key_for_query(&filter.template_args)?),
            None => {
                let resolved = self.keys.keys_for_query(&filter.template_args)?;
                (resolved.pk, resolved.sk)
            }
        };

        let template_sk = template_sk.map(SortCondition::from);
        let sk = match (filter.sk, template_sk) {
            (Some(_), Some(_)) => {
                return Err(ModelError::InvalidArguments(format!(
                    "sort key given both as '{}' filter and through key fields",
                    self.sk_name
                )))
            }
            (explicit, template) => explicit.or(template),
        };

        let mut query = Query::new()
            .pk_name(self.pk_name)
            .sk_name(self.sk_name)
            .with_pk(pk);
        if let Some(sk) = sk {
            query = query.sort(sk);
        }
        Ok(query)
    }
}

fn is_known_suffix(suffix: &str) -> bool {
    matches!(suffix, "beginswith" | "gt" | "gte" | "lt" | "lte" | "between")
}

fn segment(filter: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ModelError::InvalidArguments(format!(
            "filter '{filter}' needs a scalar value"
        ))),
    }
}

fn between(filter: &str, value: &Value) -> Result<SortCondition> {
    match value.as_array().map(Vec::as_slice) {
        Some([low, high]) => Ok(SortCondition::Between(
            segment(filter, low)?,
            segment(filter, high)?,
        )),
        _ => Err(ModelError::InvalidArguments(format!(
            "filter '{filter}' needs a two-element list"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyTemplate;
    use serde_json::json;

    fn student_keys() -> KeyFactory {
        KeyFactory::Template(
            KeyTemplate::parse("Student", "STUDENT#{firstName}", "STUDENT#{id}").unwrap(),
        )
    }

    fn request(query: Query) -> QueryRequest {
        query.build(&TableBinding::new("school")).unwrap()
    }

    #[test]
    fn test_partition_only_expression() {
        let req = request(Query::new().with_pk("USERS"));
        assert_eq!(req.key_condition_expression(), "pk = :pk");
        assert_eq!(req.expression_attribute_values().len(), 1);
        assert!(!req.scan_forward);
        assert_eq!(req.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_sort_key_expressions() {
        let cases = [
            (Query::new().with_sk("A"), "pk = :pk AND sk = :sk"),
            (
                Query::new().sk_beginswith("A"),
                "pk = :pk AND begins_with(sk, :sk)",
            ),
            (Query::new().sk_gt("A"), "pk = :pk AND sk > :sk"),
            (Query::new().sk_gte("A"), "pk = :pk AND sk >= :sk"),
            (Query::new().sk_lt("A"), "pk = :pk AND sk < :sk"),
            (Query::new().sk_lte("A"), "pk = :pk AND sk <= :sk"),
        ];
        for (query, expected) in cases {
            assert_eq!(
                request(query.with_pk("P")).key_condition_expression(),
                expected
            );
        }
    }

    #[test]
    fn test_between_uses_two_values() {
        let req = request(Query::new().with_pk("P").sk_between("2024-01", "2024-03"));
        assert_eq!(
            req.key_condition_expression(),
            "pk = :pk AND sk BETWEEN :sk1 AND :sk2"
        );
        let values = req.expression_attribute_values();
        assert_eq!(values.get(":sk1"), Some(&Attribute::s("2024-01")));
        assert_eq!(values.get(":sk2"), Some(&Attribute::s("2024-03")));
        assert!(!values.contains_key(":sk"));
    }

    #[test]
    fn test_index_query_uses_custom_key_names() {
        let req = request(
            Query::new()
                .index("gsi1")
                .pk_name("gsi1pk")
                .sk_name("gsi1sk")
                .with_pk("EMAIL#a@b.c")
                .sk_beginswith("USER#"),
        );
        assert_eq!(
            req.key_condition_expression(),
            "gsi1pk = :pk AND begins_with(gsi1sk, :sk)"
        );
        assert_eq!(req.index_name.as_deref(), Some("gsi1"));
    }

    #[test]
    fn test_projection_expression() {
        let req = request(Query::new().with_pk("P").only(["data.name", "created"]));
        assert_eq!(
            req.projection_expression().as_deref(),
            Some("#data.#name, #created")
        );
        let names = req.expression_attribute_names();
        assert_eq!(names.get("#data").map(String::as_str), Some("data"));
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_start_after_sets_exclusive_start_key() {
        let req = request(
            Query::new()
                .with_pk("P")
                .start_after(Key::new("P", "S#1")),
        );
        let start = req.exclusive_start_key.unwrap();
        assert_eq!(start.get("sk"), Some(&Attribute::s("S#1")));
    }

    #[test]
    fn test_build_requires_partition_key() {
        assert!(matches!(
            Query::new().build(&TableBinding::new("t")),
            Err(ModelError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_sort_condition_matches() {
        assert!(SortCondition::BeginsWith("A#".into()).matches("A#1"));
        assert!(!SortCondition::BeginsWith("A#".into()).matches("B#1"));
        assert!(SortCondition::Between("b".into(), "d".into()).matches("d"));
        assert!(!SortCondition::Gt("b".into()).matches("b"));
        assert!(SortCondition::Lte("b".into()).matches("b"));
    }

    #[test]
    fn test_translate_template_partition() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let query = translator
            .translate(&Args::new().with("firstName", "John"))
            .unwrap();
        assert_eq!(query.partition(), Some("STUDENT#John"));
        assert_eq!(query.sort_condition(), None);
    }

    #[test]
    fn test_translate_sk_beginswith() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let query = translator
            .translate(
                &Args::new()
                    .with("firstName", "John")
                    .with("sk__beginswith", "STUDENT#1"),
            )
            .unwrap();
        assert_eq!(
            query.sort_condition(),
            Some(&SortCondition::BeginsWith("STUDENT#1".to_string()))
        );
    }

    #[test]
    fn test_translate_template_sort_key_is_exact() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let query = translator
            .translate(&Args::new().with("firstName", "John").with("id", "7"))
            .unwrap();
        assert_eq!(
            query.sort_condition(),
            Some(&SortCondition::Eq("STUDENT#7".to_string()))
        );
    }

    #[test]
    fn test_translate_explicit_partition() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let query = translator
            .translate(&Args::new().with("pk", "STUDENT#Jane").with("sk__gte", "STUDENT#5"))
            .unwrap();
        assert_eq!(query.partition(), Some("STUDENT#Jane"));
        assert_eq!(
            query.sort_condition(),
            Some(&SortCondition::Gte("STUDENT#5".to_string()))
        );
    }

    #[test]
    fn test_translate_explicit_partition_with_sort_key_field() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let query = translator
            .translate(&Args::new().with("pk", "STUDENT#Jane").with("id", "7"))
            .unwrap();
        assert_eq!(query.partition(), Some("STUDENT#Jane"));
        assert_eq!(
            query.sort_condition(),
            Some(&SortCondition::Eq("STUDENT#7".to_string()))
        );
    }

    #[test]
    fn test_translate_between() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let filter = translator
            .parse(&Args::new().with("sk__between", json!(["A", "C"])))
            .unwrap();
        assert_eq!(
            filter.sk,
            Some(SortCondition::Between("A".to_string(), "C".to_string()))
        );

        let err = translator
            .parse(&Args::new().with("sk__between", json!(["A"])))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidArguments(_)));
    }

    #[test]
    fn test_unsupported_suffix() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let err = translator
            .parse(&Args::new().with("sk__contains", "x"))
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::UnsupportedFilter {
                filter: "sk__contains".to_string(),
                suffix: "contains".to_string()
            }
        );

        let err = translator
            .parse(&Args::new().with("pk__beginswith", "x"))
            .unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedFilter { .. }));

        let err = translator
            .parse(&Args::new().with("firstName__gt", "x"))
            .unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedFilter { .. }));
    }

    #[test]
    fn test_invalid_filter_field() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let err = translator
            .parse(&Args::new().with("lastName", "Doe"))
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidFilterField {
                field: "lastName".to_string()
            }
        );

        let err = translator
            .parse(&Args::new().with("age__gt", 3))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidFilterField { .. }));
    }

    #[test]
    fn test_translate_missing_partition_field() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let err = translator
            .translate(&Args::new().with("sk__beginswith", "STUDENT#"))
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingKeyField { .. }));
    }

    #[test]
    fn test_translate_conflicting_sort_keys() {
        let keys = student_keys();
        let translator = QueryTranslator::new("pk", "sk", &keys);
        let err = translator
            .translate(
                &Args::new()
                    .with("firstName", "John")
                    .with("id", "1")
                    .with("sk", "STUDENT#2"),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidArguments(_)));
    }
}
