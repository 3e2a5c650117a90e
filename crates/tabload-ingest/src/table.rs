//! In-memory tabular model
//!
//! A [`Table`] is an ordered list of typed [`Column`]s plus row-major [`Value`]s.
//! Column types come from a single classification pass ([`ColumnType::classify`])
//! over the raw strings produced by the reader; nothing downstream re-inspects
//! strings to decide whether a column is numeric.

use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Inferred scalar type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    /// Classify a column from its non-missing raw values
    ///
    /// Every value parses as `i64` → `Integer`; every value parses as `f64` → `Real`;
    /// anything else (including a column with no values at all) → `Text`.
    pub fn classify<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = false;
        let mut integer = true;

        for raw in values {
            seen = true;
            if integer && raw.parse::<i64>().is_ok() {
                continue;
            }
            integer = false;
            if raw.parse::<f64>().is_err() {
                return ColumnType::Text;
            }
        }

        match (seen, integer) {
            (false, _) => ColumnType::Text,
            (true, true) => ColumnType::Integer,
            (true, false) => ColumnType::Real,
        }
    }

    /// Convert a raw cell of an already-classified column
    pub fn parse(self, raw: &str) -> Value {
        match self {
            ColumnType::Integer => raw.parse().map(Value::Integer).unwrap_or(Value::Null),
            ColumnType::Real => raw.parse().map(Value::Real).unwrap_or(Value::Null),
            ColumnType::Text => Value::Text(raw.to_string()),
        }
    }

    /// PostgreSQL column type used when the table is materialized
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "BIGINT",
            ColumnType::Real => "DOUBLE PRECISION",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Text => write!(f, "text"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Real => write!(f, "real"),
        }
    }
}

/// A single cell
///
/// Reals compare and hash by bit pattern so that whole rows can be used as
/// hash keys during deduplication.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {},
            Value::Integer(v) => v.hash(state),
            Value::Real(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

/// Named, typed column description
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A row does not line up with the column list
#[derive(Debug, Error, PartialEq, Eq)]
#[error("row {row} has {found} values but the table has {expected} columns")]
pub struct ShapeError {
    pub row: usize,
    pub found: usize,
    pub expected: usize,
}

/// In-memory table; every row holds exactly one value per column
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table from typed columns and rows
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self, ShapeError> {
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != columns.len())
        {
            return Err(ShapeError {
                row,
                found: values.len(),
                expected: columns.len(),
            });
        }

        Ok(Self { columns, rows })
    }

    /// Build a table from raw cells, running the per-column classification pass
    ///
    /// `None` cells are missing values (null tokens already resolved by the reader).
    pub fn from_raw(
        headers: Vec<String>,
        records: Vec<Vec<Option<String>>>,
    ) -> Result<Self, ShapeError> {
        if let Some((row, record)) = records
            .iter()
            .enumerate()
            .find(|(_, record)| record.len() != headers.len())
        {
            return Err(ShapeError {
                row,
                found: record.len(),
                expected: headers.len(),
            });
        }

        let columns: Vec<Column> = headers
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let kind =
                    ColumnType::classify(records.iter().filter_map(|r| r[idx].as_deref()));
                Column::new(name, kind)
            })
            .collect();

        let rows = records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .zip(&columns)
                    .map(|(cell, column)| match cell {
                        Some(raw) => column.kind.parse(&raw),
                        None => Value::Null,
                    })
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Values of one column, top to bottom
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Append a column; `values` must have one entry per row
    pub fn push_column(&mut self, column: Column, values: Vec<Value>) -> Result<(), ShapeError> {
        if values.len() != self.rows.len() {
            return Err(ShapeError {
                row: values.len().min(self.rows.len()),
                found: values.len(),
                expected: self.rows.len(),
            });
        }

        self.columns.push(column);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Keep only the columns for which `keep` returns true
    pub(crate) fn retain_columns<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize, &Column) -> bool,
    {
        let mask: Vec<bool> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| keep(idx, column))
            .collect();

        let mut idx = 0;
        self.columns.retain(|_| {
            let kept = mask[idx];
            idx += 1;
            kept
        });

        for row in &mut self.rows {
            let mut idx = 0;
            row.retain(|_| {
                let kept = mask[idx];
                idx += 1;
                kept
            });
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Vec<Value>> {
        &mut self.rows
    }
}
