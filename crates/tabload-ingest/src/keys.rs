//! Primary-key candidate selection
//!
//! The TXT family chooses between a natural key and an injected synthetic key.
//! The normalizer and the key assigner both go through [`natural_key_qualifies`]
//! so they can never disagree about which column identifies a row.

use std::collections::HashSet;

use serde::Serialize;

use crate::table::Table;

/// Natural and synthetic key column names for a family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumns {
    pub natural: String,
    pub synthetic: String,
}

impl KeyColumns {
    pub fn new(natural: impl Into<String>, synthetic: impl Into<String>) -> Self {
        Self {
            natural: natural.into(),
            synthetic: synthetic.into(),
        }
    }
}

/// Which column ended up as the primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "column", rename_all = "lowercase")]
pub enum KeyChoice {
    Natural(String),
    Synthetic(String),
}

impl KeyChoice {
    pub fn column(&self) -> &str {
        match self {
            KeyChoice::Natural(c) | KeyChoice::Synthetic(c) => c,
        }
    }
}

/// Column present AND no missing values AND all values distinct
pub fn natural_key_qualifies(table: &Table, column: &str) -> bool {
    let Some(idx) = table.column_index(column) else {
        return false;
    };

    let mut seen = HashSet::with_capacity(table.num_rows());
    table
        .column_values(idx)
        .all(|value| !value.is_null() && seen.insert(value))
}

/// Whether any value of `column` is missing; false when the column is absent
pub fn has_missing(table: &Table, column: &str) -> bool {
    table
        .column_index(column)
        .is_some_and(|idx| table.column_values(idx).any(|v| v.is_null()))
}

/// Derive the key decision from a normalized table
///
/// `synthetic_injected` says whether the normalizer generated the synthetic
/// column. A source column that merely shares the synthetic name is ordinary
/// data and never becomes the key.
pub fn resolve_key(table: &Table, keys: &KeyColumns, synthetic_injected: bool) -> Option<KeyChoice> {
    if synthetic_injected {
        table
            .has_column(&keys.synthetic)
            .then(|| KeyChoice::Synthetic(keys.synthetic.clone()))
    } else if natural_key_qualifies(table, &keys.natural) {
        Some(KeyChoice::Natural(keys.natural.clone()))
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnType, Value};

    fn single(name: &str, values: Vec<Value>) -> Table {
        Table::new(
            vec![Column::new(name, ColumnType::Text)],
            values.into_iter().map(|v| vec![v]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_qualifies_requires_presence_uniqueness_and_no_nulls() {
        let unique = single("np_id", vec!["a".into(), "b".into()]);
        assert!(natural_key_qualifies(&unique, "np_id"));
        assert!(!natural_key_qualifies(&unique, "other"));

        let dup = single("np_id", vec!["a".into(), "a".into()]);
        assert!(!natural_key_qualifies(&dup, "np_id"));

        let null = single("np_id", vec!["a".into(), Value::Null]);
        assert!(!natural_key_qualifies(&null, "np_id"));
        assert!(has_missing(&null, "np_id"));
        assert!(!has_missing(&null, "absent"));
    }

    #[test]
    fn test_resolve_follows_injection() {
        let keys = KeyColumns::new("np_id", "custom_id");

        let natural = single("np_id", vec!["a".into()]);
        assert_eq!(
            resolve_key(&natural, &keys, false),
            Some(KeyChoice::Natural("np_id".into()))
        );

        let synthetic = single("custom_id", vec!["x".into()]);
        let choice = resolve_key(&synthetic, &keys, true).unwrap();
        assert_eq!(choice, KeyChoice::Synthetic("custom_id".into()));
        assert_eq!(choice.column(), "custom_id");

        let neither = single("name", vec!["a".into()]);
        assert_eq!(resolve_key(&neither, &keys, false), None);
        assert_eq!(resolve_key(&neither, &keys, true), None);
    }

    #[test]
    fn test_source_column_with_synthetic_name_is_not_a_key() {
        let keys = KeyColumns::new("np_id", "custom_id");
        let table = Table::new(
            vec![
                Column::new("np_id", ColumnType::Text),
                Column::new("custom_id", ColumnType::Integer),
            ],
            vec![
                vec!["npc1".into(), Value::Integer(1)],
                vec!["npc2".into(), Value::Integer(1)],
            ],
        )
        .unwrap();

        assert_eq!(
            resolve_key(&table, &keys, false),
            Some(KeyChoice::Natural("np_id".into()))
        );
    }
}
