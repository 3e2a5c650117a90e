//! Table normalization
//!
//! Every family gets the same cleanliness baseline (dedup, all-null column
//! pruning, typed null fill). The TXT family additionally lowercases text and
//! injects a synthetic key when its natural key does not qualify. The two entry
//! points are kept separate so TXT-only rules can never leak into CSV loads.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::keys::{self, KeyChoice, KeyColumns};
use crate::table::{Column, ColumnType, ShapeError, Table, Value};

/// Replacement for missing text cells
pub const UNKNOWN_TEXT: &str = "unknown";

/// What normalization changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub duplicates_removed: usize,
    pub columns_dropped: Vec<String>,
    pub cells_filled: usize,
    pub synthetic_key_added: bool,
    /// Key column the normalizer prepared the table for (TXT only)
    pub key: Option<KeyChoice>,
}

/// CSV-family policy: dedup, prune all-null columns, fill nulls
pub fn normalize_csv(mut table: Table) -> (Table, NormalizeStats) {
    let stats = NormalizeStats {
        duplicates_removed: drop_duplicate_rows(&mut table),
        columns_dropped: drop_empty_columns(&mut table),
        cells_filled: fill_missing(&mut table),
        synthetic_key_added: false,
        key: None,
    };
    (table, stats)
}

/// TXT-family policy: the CSV baseline plus lowercasing and synthetic keys
pub fn normalize_txt(mut table: Table, keys: &KeyColumns) -> Result<(Table, NormalizeStats), ShapeError> {
    let duplicates_removed = drop_duplicate_rows(&mut table);
    let columns_dropped = drop_empty_columns(&mut table);

    // Missing natural keys are invisible once filled, so look before filling
    let natural_had_missing = keys::has_missing(&table, &keys.natural);
    let cells_filled = fill_missing(&mut table);
    lowercase_text(&mut table);

    let synthetic_key_added =
        natural_had_missing || !keys::natural_key_qualifies(&table, &keys.natural);
    if synthetic_key_added {
        inject_synthetic_key(&mut table, &keys.synthetic)?;
    }
    let key = keys::resolve_key(&table, keys, synthetic_key_added);

    Ok((
        table,
        NormalizeStats {
            duplicates_removed,
            columns_dropped,
            cells_filled,
            synthetic_key_added,
            key,
        },
    ))
}

/// Collapse fully identical rows, keeping the first occurrence in order
pub fn drop_duplicate_rows(table: &mut Table) -> usize {
    let before = table.num_rows();
    let mut seen = HashSet::with_capacity(before);
    table.rows_mut().retain(|row| seen.insert(row.clone()));
    before - table.num_rows()
}

/// Drop columns whose every value is missing; returns the dropped names
pub fn drop_empty_columns(table: &mut Table) -> Vec<String> {
    let empty: Vec<bool> = (0..table.num_columns())
        .map(|idx| table.column_values(idx).all(Value::is_null))
        .collect();

    let dropped: Vec<String> = table
        .columns()
        .iter()
        .zip(&empty)
        .filter(|(_, is_empty)| **is_empty)
        .map(|(column, _)| column.name.clone())
        .collect();

    if !dropped.is_empty() {
        debug!(columns = ?dropped, "Dropping all-null columns");
        table.retain_columns(|idx, _| !empty[idx]);
    }

    dropped
}

/// Replace missing values by column type: text → "unknown", numeric → 0
pub fn fill_missing(table: &mut Table) -> usize {
    let fills: Vec<Value> = table
        .columns()
        .iter()
        .map(|column| match column.kind {
            ColumnType::Text => Value::Text(UNKNOWN_TEXT.to_string()),
            ColumnType::Integer => Value::Integer(0),
            ColumnType::Real => Value::Real(0.0),
        })
        .collect();

    let mut filled = 0;
    for row in table.rows_mut() {
        for (value, fill) in row.iter_mut().zip(&fills) {
            if value.is_null() {
                *value = fill.clone();
                filled += 1;
            }
        }
    }
    filled
}

/// Lowercase every value of every text column
pub fn lowercase_text(table: &mut Table) {
    for row in table.rows_mut() {
        for value in row.iter_mut() {
            if let Value::Text(text) = value {
                if text.chars().any(char::is_uppercase) {
                    *text = text.to_lowercase();
                }
            }
        }
    }
}

/// Append a column of distinct UUID strings, one per row
///
/// A source column that already carries the synthetic name is replaced.
pub fn inject_synthetic_key(table: &mut Table, column: &str) -> Result<(), ShapeError> {
    if table.has_column(column) {
        debug!(column = %column, "Replacing existing column with synthetic key");
        table.retain_columns(|_, c| c.name != column);
    }

    let mut issued = HashSet::with_capacity(table.num_rows());
    let values = (0..table.num_rows())
        .map(|_| loop {
            let id = Uuid::new_v4().to_string();
            if issued.insert(id.clone()) {
                break Value::Text(id);
            }
        })
        .collect();

    table.push_column(Column::new(column, ColumnType::Text), values)
}
