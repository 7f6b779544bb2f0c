//! Table configuration types (Functional Core - pure data).

use super::error::{DynamodbError, Result};

/// Default table name.
pub const DEFAULT_TABLE_NAME: &str = "cloudlydb";

/// Table schema configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: KeyAttribute,
    pub gsis: Vec<GsiConfig>,
}

/// A string key attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    pub name: String,
}

impl KeyAttribute {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Global Secondary Index configuration. Projects all attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsiConfig {
    pub name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: KeyAttribute,
}

impl GsiConfig {
    /// An index named `name` keyed on `<name>pk` and `<name>sk`.
    pub fn named(name: &str) -> Result<Self> {
        let valid = (3..=255).contains(&name.len())
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(DynamodbError::InvalidIndexName(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            partition_key: KeyAttribute::new(format!("{name}pk")),
            sort_key: KeyAttribute::new(format!("{name}sk")),
        })
    }
}

impl TableConfig {
    /// The single-table layout the mapper reads and writes: string `pk`
    /// and `sk`, plus the requested indexes.
    ///
    /// This is a pure function - no I/O.
    pub fn cloudlydb(table_name: &str, gsi_names: &[String]) -> Result<Self> {
        let mut gsis: Vec<GsiConfig> = Vec::with_capacity(gsi_names.len());
        for name in gsi_names {
            if !gsis.iter().any(|g| &g.name == name) {
                gsis.push(GsiConfig::named(name)?);
            }
        }

        Ok(Self {
            table_name: table_name.to_string(),
            partition_key: KeyAttribute::new("pk"),
            sort_key: KeyAttribute::new("sk"),
            gsis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = TableConfig::cloudlydb(DEFAULT_TABLE_NAME, &[]).unwrap();
        assert_eq!(config.partition_key.name, "pk");
        assert_eq!(config.sort_key.name, "sk");
        assert!(config.gsis.is_empty());
    }

    #[test]
    fn test_gsi_key_names() {
        let config =
            TableConfig::cloudlydb("school", &["gsi1".to_string(), "gsi1".to_string()]).unwrap();
        assert_eq!(config.gsis.len(), 1);
        assert_eq!(config.gsis[0].partition_key.name, "gsi1pk");
        assert_eq!(config.gsis[0].sort_key.name, "gsi1sk");
    }

    #[test]
    fn test_rejects_bad_index_names() {
        assert!(matches!(
            GsiConfig::named("by name"),
            Err(DynamodbError::InvalidIndexName(_))
        ));
        assert!(GsiConfig::named("ix").is_err());
    }
}
