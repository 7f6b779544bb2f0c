//! Key generation.
//!
//! A model's items are addressed by a partition key and a sort key derived
//! from the call's arguments. The default strategy renders a pair of
//! [`Template`]s; callers can plug in their own [`KeyStrategy`] instead.
//! Everything here is pure and runs before the store is contacted.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::args::Args;
use crate::error::{ModelError, Result};
use crate::schema::ID_FIELD;

/// Separator between the type name and the identifier in default sort keys.
pub const KEY_SEPARATOR: &str = "#";

/// A fully resolved item key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub pk: String,
    pub sk: String,
}

impl Key {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// Sort-key part of a query key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Exact(String),
    Prefix(String),
}

/// Key used to address a partition, optionally narrowed by sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyQuery {
    pub pk: String,
    pub sk: Option<SortKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A key template such as `STUDENT#{firstName}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template. Fields are written as `{name}`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| ModelError::InvalidTemplate {
            template: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(invalid("nested '{'")),
                            c => name.push(c),
                        }
                    }
                    if !closed {
                        return Err(invalid("unclosed '{'"));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(invalid("empty field name"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name.to_string()));
                }
                '}' => return Err(invalid("unmatched '}'")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// A constant template, taken verbatim.
    pub fn literal(value: impl Into<String>) -> Self {
        let raw = value.into();
        Self {
            segments: vec![Segment::Literal(raw.clone())],
            raw,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the fields the template references, in order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn is_static(&self) -> bool {
        self.fields().next().is_none()
    }

    /// Render the template, failing on the first missing field.
    pub fn render(&self, args: &Args, model: &str) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(name) => match args.key_segment(name)? {
                    Some(value) => out.push_str(&value),
                    None => {
                        return Err(ModelError::MissingKeyField {
                            model: model.to_string(),
                            field: name.clone(),
                        })
                    }
                },
            }
        }
        Ok(out)
    }

    /// Render up to the first missing field.
    pub fn prefix(&self, args: &Args) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(name) => match args.key_segment(name)? {
                    Some(value) => out.push_str(&value),
                    None => break,
                },
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Derives item keys from call arguments.
pub trait KeyStrategy: Send + Sync {
    /// Full key of a single item. Used by create and every keyed operation.
    fn keys_for_create(&self, args: &Args) -> Result<Key>;

    /// Partition key plus an optional exact or prefix sort key, used by
    /// queries.
    fn keys_for_query(&self, args: &Args) -> Result<KeyQuery>;

    /// Sort key alone, for queries whose partition key is given explicitly.
    fn sort_key_for_query(&self, args: &Args) -> Result<Option<SortKey>> {
        self.keys_for_query(args).map(|query| query.sk)
    }

    /// Argument names the strategy reads. These are accepted as equality
    /// filters.
    fn key_fields(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Template-based strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    model: String,
    pk: Template,
    sk: Template,
}

impl KeyTemplate {
    pub fn new(model: impl Into<String>, pk: Template, sk: Template) -> Self {
        Self {
            model: model.into(),
            pk,
            sk,
        }
    }

    /// Parse both templates.
    pub fn parse(model: impl Into<String>, pk: &str, sk: &str) -> Result<Self> {
        Ok(Self::new(model, Template::parse(pk)?, Template::parse(sk)?))
    }

    /// Default keys: the qualified type name as partition key and
    /// `<Name>#{id}` as sort key.
    pub fn default_for(qualified_name: &str, name: &str) -> Self {
        Self {
            model: name.to_string(),
            pk: Template::literal(qualified_name),
            sk: Template {
                raw: format!("{name}{KEY_SEPARATOR}{{{ID_FIELD}}}"),
                segments: vec![
                    Segment::Literal(format!("{name}{KEY_SEPARATOR}")),
                    Segment::Field(ID_FIELD.to_string()),
                ],
            },
        }
    }

    pub fn pk(&self) -> &Template {
        &self.pk
    }

    pub fn sk(&self) -> &Template {
        &self.sk
    }
}

impl KeyStrategy for KeyTemplate {
    fn keys_for_create(&self, args: &Args) -> Result<Key> {
        Ok(Key {
            pk: self.pk.render(args, &self.model)?,
            sk: self.sk.render(args, &self.model)?,
        })
    }

    fn keys_for_query(&self, args: &Args) -> Result<KeyQuery> {
        Ok(KeyQuery {
            pk: self.pk.render(args, &self.model)?,
            sk: self.sort_key_for_query(args)?,
        })
    }

    fn sort_key_for_query(&self, args: &Args) -> Result<Option<SortKey>> {
        let sk_fields: Vec<&str> = self.sk.fields().collect();
        let supplied = sk_fields.iter().filter(|f| args.has(f)).count();
        if supplied == sk_fields.len() {
            Ok(Some(SortKey::Exact(self.sk.render(args, &self.model)?)))
        } else if supplied > 0 {
            Ok(Some(SortKey::Prefix(self.sk.prefix(args)?)))
        } else {
            Ok(None)
        }
    }

    fn key_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.pk.fields().map(str::to_string).collect();
        for field in self.sk.fields() {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        fields
    }
}

type CreateFn = dyn Fn(&Args) -> Result<Key> + Send + Sync;
type QueryFn = dyn Fn(&Args) -> Result<KeyQuery> + Send + Sync;

/// Caller-supplied strategy made of two functions.
pub struct CustomKeys {
    create: Box<CreateFn>,
    query: Box<QueryFn>,
    fields: Vec<String>,
}

impl CustomKeys {
    pub fn new<C, Q>(create: C, query: Q) -> Self
    where
        C: Fn(&Args) -> Result<Key> + Send + Sync + 'static,
        Q: Fn(&Args) -> Result<KeyQuery> + Send + Sync + 'static,
    {
        Self {
            create: Box::new(create),
            query: Box::new(query),
            fields: Vec::new(),
        }
    }

    /// Declare which argument names the functions read, so they can be used
    /// as filters.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Debug for CustomKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomKeys")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl KeyStrategy for CustomKeys {
    fn keys_for_create(&self, args: &Args) -> Result<Key> {
        (self.create)(args)
    }

    fn keys_for_query(&self, args: &Args) -> Result<KeyQuery> {
        (self.query)(args)
    }

    fn key_fields(&self) -> Vec<String> {
        self.fields.clone()
    }
}

/// The key strategy bound to a model.
#[derive(Clone)]
pub enum KeyFactory {
    Template(KeyTemplate),
    Custom(Arc<dyn KeyStrategy>),
}

impl KeyFactory {
    pub fn custom(strategy: impl KeyStrategy + 'static) -> Self {
        KeyFactory::Custom(Arc::new(strategy))
    }

    fn strategy(&self) -> &dyn KeyStrategy {
        match self {
            KeyFactory::Template(template) => template,
            KeyFactory::Custom(strategy) => strategy.as_ref(),
        }
    }

    pub fn keys_for_create(&self, args: &Args) -> Result<Key> {
        self.strategy().keys_for_create(args)
    }

    pub fn keys_for_query(&self, args: &Args) -> Result<KeyQuery> {
        self.strategy().keys_for_query(args)
    }

    pub fn sort_key_for_query(&self, args: &Args) -> Result<Option<SortKey>> {
        self.strategy().sort_key_for_query(args)
    }

    pub fn key_fields(&self) -> Vec<String> {
        self.strategy().key_fields()
    }
}

impl fmt::Debug for KeyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFactory::Template(template) => f.debug_tuple("Template").field(template).finish(),
            KeyFactory::Custom(strategy) => f
                .debug_struct("Custom")
                .field("fields", &strategy.key_fields())
                .finish(),
        }
    }
}

/// Generate a new record identifier.
///
/// Pattern: `<unix seconds>.<micros>-<uuid v4>`, so identifiers created later
/// sort after earlier ones.
pub fn new_record_id() -> String {
    let now = Utc::now();
    format!(
        "{}.{:06}-{}",
        now.timestamp(),
        now.timestamp_subsec_micros(),
        Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student_keys() -> KeyTemplate {
        KeyTemplate::parse("Student", "STUDENT#{firstName}", "STUDENT#{id}").unwrap()
    }

    #[test]
    fn test_template_parse_fields() {
        let template = Template::parse("ENTRY#{date}#{id}").unwrap();
        assert_eq!(template.fields().collect::<Vec<_>>(), vec!["date", "id"]);
        assert!(!template.is_static());
        assert!(Template::parse("USERS").unwrap().is_static());
    }

    #[test]
    fn test_template_parse_errors() {
        for raw in ["A#{id", "A#id}", "A#{}", "A#{{id}}"] {
            assert!(
                matches!(Template::parse(raw), Err(ModelError::InvalidTemplate { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_render_and_prefix() {
        let template = Template::parse("ENTRY#{date}#{id}").unwrap();
        let args = Args::new().with("date", "2024-06-15");

        assert_eq!(template.prefix(&args).unwrap(), "ENTRY#2024-06-15#");
        assert_eq!(
            template.render(&args, "Entry").unwrap_err(),
            ModelError::MissingKeyField {
                model: "Entry".to_string(),
                field: "id".to_string()
            }
        );

        let args = args.with("id", 7);
        assert_eq!(template.render(&args, "Entry").unwrap(), "ENTRY#2024-06-15#7");
    }

    #[test]
    fn test_static_template_needs_no_arguments() {
        let keys = KeyTemplate::parse("Settings", "SETTINGS", "GLOBAL").unwrap();
        assert_eq!(
            keys.keys_for_create(&Args::new()).unwrap(),
            Key::new("SETTINGS", "GLOBAL")
        );
    }

    #[test]
    fn test_keys_for_create_requires_every_field() {
        let keys = student_keys();
        let args = Args::new().with("id", "42");
        assert_eq!(
            keys.keys_for_create(&args).unwrap_err(),
            ModelError::MissingKeyField {
                model: "Student".to_string(),
                field: "firstName".to_string()
            }
        );

        let args = args.with("firstName", "John");
        assert_eq!(
            keys.keys_for_create(&args).unwrap(),
            Key::new("STUDENT#John", "STUDENT#42")
        );
    }

    #[test]
    fn test_keys_for_query_sort_key_forms() {
        let keys = student_keys();
        let partition_only = keys
            .keys_for_query(&Args::new().with("firstName", "John"))
            .unwrap();
        assert_eq!(partition_only.pk, "STUDENT#John");
        assert_eq!(partition_only.sk, None);

        let exact = keys
            .keys_for_query(&Args::new().with("firstName", "John").with("id", "1"))
            .unwrap();
        assert_eq!(exact.sk, Some(SortKey::Exact("STUDENT#1".to_string())));

        let composite = KeyTemplate::parse("Visit", "SITE#{site}", "VISIT#{date}#{id}").unwrap();
        let prefix = composite
            .keys_for_query(&Args::new().with("site", "s1").with("date", "2024-01-15"))
            .unwrap();
        assert_eq!(
            prefix.sk,
            Some(SortKey::Prefix("VISIT#2024-01-15#".to_string()))
        );
    }

    #[test]
    fn test_default_template() {
        let keys = KeyTemplate::default_for("school::Student", "Student");
        let key = keys.keys_for_create(&Args::new().with("id", "abc")).unwrap();
        assert_eq!(key, Key::new("school::Student", "Student#abc"));
        assert_eq!(keys.key_fields(), vec!["id".to_string()]);
        assert_eq!(keys.sk().as_str(), "Student#{id}");
    }

    #[test]
    fn test_custom_strategy_wraps_template() {
        let base = KeyTemplate::default_for("school::Class", "Class");
        let create_base = base.clone();
        let custom = CustomKeys::new(
            move |args| {
                let mut key = create_base.keys_for_create(args)?;
                let country = args.key_segment("country")?.unwrap_or_else(|| "USA".to_string());
                key.pk = format!("DATA#FAKA#{country}");
                Ok(key)
            },
            move |args| base.keys_for_query(args),
        )
        .with_fields(["country", "id"]);
        let factory = KeyFactory::custom(custom);

        let key = factory
            .keys_for_create(&Args::new().with("id", "1").with("country", "UK"))
            .unwrap();
        assert_eq!(key, Key::new("DATA#FAKA#UK", "Class#1"));
        assert_eq!(factory.key_fields(), vec!["country", "id"]);
    }

    #[test]
    fn test_new_record_ids_differ() {
        let a = new_record_id();
        let b = new_record_id();
        assert_ne!(a, b);
        assert!(a.contains('-'));
    }
}
