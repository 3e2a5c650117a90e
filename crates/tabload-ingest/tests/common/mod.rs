//! Shared helpers for tabload-ingest integration tests
//!
//! [`MemoryStore`] is an in-memory [`TableStore`] that applies the same rules a
//! PostgreSQL database would for the operations the loader issues: primary keys
//! must be present and unique, foreign keys need a keyed referenced column, a
//! matching column type and no dangling values.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tabload_ingest::relations::Relationship;
use tabload_ingest::store::{StoreError, StoreResult, TableStore};
use tabload_ingest::table::{Column, ColumnType, Table, Value};

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tabload_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Write `contents` to `dir/name`
pub fn write_file(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

/// A stored relation
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    pub primary_key: Option<String>,
}

impl StoredTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Values of `column`, top to bottom
    pub fn values(&self, column: &str) -> Vec<Value> {
        let idx = self.column_index(column).unwrap();
        self.rows.iter().map(|row| row[idx].clone()).collect()
    }

    fn require_column(&self, name: &str, table: &str) -> StoreResult<usize> {
        self.column_index(name).ok_or_else(|| {
            StoreError::rejected(format!("column \"{}\" of relation \"{}\" does not exist", name, table))
        })
    }

    fn keys(&self, column: usize) -> HashSet<i64> {
        self.rows.iter().filter_map(|row| row[column].as_i64()).collect()
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, StoredTable>,
    foreign_keys: BTreeMap<String, Relationship>,
    rejected: HashSet<String>,
    closes: usize,
}

impl State {
    fn table(&self, name: &str) -> StoreResult<&StoredTable> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::rejected(format!("relation \"{}\" does not exist", name)))
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut StoredTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::rejected(format!("relation \"{}\" does not exist", name)))
    }

    /// Dependent values with no referenced row; errors like a type mismatch would
    fn orphans(&self, rel: &Relationship) -> StoreResult<Vec<i64>> {
        let dependent = self.table(rel.dependent_table)?;
        let referenced = self.table(rel.referenced_table)?;
        let dep_idx = dependent.require_column(rel.dependent_column, rel.dependent_table)?;
        let ref_idx = referenced.require_column(rel.referenced_column, rel.referenced_table)?;

        if dependent.columns[dep_idx].kind != ColumnType::Integer
            || referenced.columns[ref_idx].kind != ColumnType::Integer
        {
            return Err(StoreError::rejected(format!(
                "operator does not exist: {} = {}",
                dependent.columns[dep_idx].kind.sql_type(),
                referenced.columns[ref_idx].kind.sql_type()
            )));
        }

        let keys = referenced.keys(ref_idx);
        let mut orphans: Vec<i64> = dependent
            .keys(dep_idx)
            .into_iter()
            .filter(|value| !keys.contains(value))
            .collect();
        orphans.sort_unstable();
        Ok(orphans)
    }
}

/// In-memory store; clones share the same tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<StoredTable> {
        self.state.lock().unwrap().tables.get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state.lock().unwrap().tables.keys().cloned().collect()
    }

    pub fn primary_key(&self, table: &str) -> Option<String> {
        self.table(table).and_then(|t| t.primary_key)
    }

    /// Installed foreign-key constraint names, sorted
    pub fn foreign_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().foreign_keys.keys().cloned().collect()
    }

    /// Make every later `replace_table` for `name` fail, as a rolled-back transaction would
    pub fn reject_table(&self, name: &str) {
        self.state.lock().unwrap().rejected.insert(name.to_string());
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    /// Dangling dependent values for `rel`, or `None` if they cannot be compared
    pub fn dangling(&self, rel: &Relationship) -> Option<Vec<i64>> {
        self.state.lock().unwrap().orphans(rel).ok()
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn replace_table(&self, name: &str, table: &Table) -> StoreResult<u64> {
        let mut state = self.state.lock().unwrap();
        if state.rejected.contains(name) {
            return Err(StoreError::rejected(format!("could not create relation \"{}\"", name)));
        }

        // DROP ... CASCADE
        state
            .foreign_keys
            .retain(|_, rel| rel.dependent_table != name && rel.referenced_table != name);
        state.tables.insert(
            name.to_string(),
            StoredTable {
                columns: table.columns().to_vec(),
                rows: table.rows().to_vec(),
                primary_key: None,
            },
        );
        Ok(table.num_rows() as u64)
    }

    async fn add_primary_key(&self, table: &str, column: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let stored = state.table_mut(table)?;
        let idx = stored.require_column(column, table)?;

        if stored.primary_key.is_some() {
            return Err(StoreError::rejected(format!(
                "multiple primary keys for table \"{}\" are not allowed",
                table
            )));
        }

        let mut seen = HashSet::new();
        for row in &stored.rows {
            if row[idx].is_null() {
                return Err(StoreError::rejected(format!(
                    "column \"{}\" of relation \"{}\" contains null values",
                    column, table
                )));
            }
            if !seen.insert(row[idx].clone()) {
                return Err(StoreError::rejected(format!(
                    "could not create unique index \"{}_{}_pk\": duplicate key {}",
                    table, column, row[idx]
                )));
            }
        }

        stored.primary_key = Some(column.to_string());
        Ok(())
    }

    async fn coerce_to_integer(&self, table: &str, column: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let stored = state.table_mut(table)?;
        let idx = stored.require_column(column, table)?;

        let mut coerced = Vec::with_capacity(stored.rows.len());
        for row in &stored.rows {
            let value = match &row[idx] {
                Value::Null => Value::Null,
                Value::Integer(v) => Value::Integer(*v),
                Value::Real(v) => Value::Integer(v.round() as i64),
                Value::Text(raw) => match raw.trim().parse::<f64>() {
                    Ok(v) if v.is_finite() => Value::Integer(v.round() as i64),
                    _ => {
                        return Err(StoreError::rejected(format!(
                            "invalid input syntax for type numeric: \"{}\"",
                            raw
                        )))
                    },
                },
            };
            coerced.push(value);
        }

        for (row, value) in stored.rows.iter_mut().zip(coerced) {
            row[idx] = value;
        }
        stored.columns[idx].kind = ColumnType::Integer;
        Ok(())
    }

    async fn ensure_key_row(&self, table: &str, column: &str, id: i64) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        let stored = state.table_mut(table)?;
        let idx = stored.require_column(column, table)?;

        if stored.rows.iter().any(|row| row[idx].as_i64() == Some(id)) {
            return Ok(false);
        }

        let mut row = vec![Value::Null; stored.columns.len()];
        row[idx] = Value::Integer(id);
        stored.rows.push(row);
        Ok(true)
    }

    async fn find_orphans(&self, relationship: &Relationship) -> StoreResult<Vec<i64>> {
        self.state.lock().unwrap().orphans(relationship)
    }

    async fn lowest_key(&self, table: &str, column: &str) -> StoreResult<Option<i64>> {
        let state = self.state.lock().unwrap();
        let stored = state.table(table)?;
        let idx = stored.require_column(column, table)?;
        Ok(stored.keys(idx).into_iter().min())
    }

    async fn remap_orphans(&self, relationship: &Relationship, target: i64) -> StoreResult<u64> {
        let mut state = self.state.lock().unwrap();
        let orphans: HashSet<i64> = state.orphans(relationship)?.into_iter().collect();

        let stored = state.table_mut(relationship.dependent_table)?;
        let idx = stored.require_column(relationship.dependent_column, relationship.dependent_table)?;

        let mut updated = 0;
        for row in &mut stored.rows {
            if row[idx].as_i64().is_some_and(|v| orphans.contains(&v)) {
                row[idx] = Value::Integer(target);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn add_foreign_key(&self, relationship: &Relationship) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let name = relationship.constraint_name();

        if state.foreign_keys.contains_key(&name) {
            return Err(StoreError::rejected(format!("constraint \"{}\" already exists", name)));
        }

        let referenced = state.table(relationship.referenced_table)?;
        if referenced.primary_key.as_deref() != Some(relationship.referenced_column) {
            return Err(StoreError::rejected(format!(
                "there is no unique constraint matching given keys for referenced table \"{}\"",
                relationship.referenced_table
            )));
        }

        let orphans = state.orphans(relationship)?;
        if let Some(value) = orphans.first() {
            return Err(StoreError::rejected(format!(
                "insert or update on table \"{}\" violates foreign key constraint \"{}\": key ({})=({}) is not present",
                relationship.dependent_table, name, relationship.dependent_column, value
            )));
        }

        state.foreign_keys.insert(name, *relationship);
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().closes += 1;
    }
}
