//! Relational store access
//!
//! [`TableStore`] is the seam between the pipeline and the database. The
//! pipeline only speaks in tables, keys and relationships; [`PgStore`] turns
//! those into PostgreSQL DDL/DML over a single pooled connection.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tabload_common::LoadError;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::relations::Relationship;
use crate::table::{ColumnType, Table, Value};

/// PostgreSQL caps a single statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The store refused the operation (e.g. duplicate key values)
    #[error("{0}")]
    Rejected(String),
}

impl StoreError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the pipeline needs from a relational store
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Drop any relation named `name` and recreate it from `table`; returns rows inserted
    async fn replace_table(&self, name: &str, table: &Table) -> StoreResult<u64>;

    /// Install `<table>_<column>_pk`
    async fn add_primary_key(&self, table: &str, column: &str) -> StoreResult<()>;

    /// Change a column to a 64-bit integer type, converting existing values
    async fn coerce_to_integer(&self, table: &str, column: &str) -> StoreResult<()>;

    /// Insert a row with `column = id` unless one exists; true when inserted
    async fn ensure_key_row(&self, table: &str, column: &str, id: i64) -> StoreResult<bool>;

    /// Distinct non-null dependent values with no referenced row, ascending
    async fn find_orphans(&self, relationship: &Relationship) -> StoreResult<Vec<i64>>;

    /// Smallest referenced key, if the referenced table has rows
    async fn lowest_key(&self, table: &str, column: &str) -> StoreResult<Option<i64>>;

    /// Point every orphaned dependent value at `target`; returns rows updated
    async fn remap_orphans(&self, relationship: &Relationship, target: i64) -> StoreResult<u64>;

    /// Install the foreign-key constraint for `relationship`
    async fn add_foreign_key(&self, relationship: &Relationship) -> StoreResult<()>;

    /// Release the underlying connection; calling it again is a no-op
    async fn close(&self);
}

/// Quote an identifier for PostgreSQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open the single connection used for a whole run
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, LoadError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.connection_url())
            .await
            .map_err(|e| {
                LoadError::Connection(format!("cannot connect to {}: {}", config.redacted_url(), e))
            })?;

        info!(url = %config.redacted_url(), "Connected to store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute(&self, sql: &str) -> StoreResult<u64> {
        debug!(sql = %sql, "Executing statement");
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn push_value(
    row: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>,
    value: &Value,
    kind: ColumnType,
) {
    match (value, kind) {
        (Value::Integer(v), _) => row.push_bind(*v),
        (Value::Real(v), _) => row.push_bind(*v),
        (Value::Text(v), _) => row.push_bind(v.clone()),
        (Value::Null, ColumnType::Integer) => row.push_bind(None::<i64>),
        (Value::Null, ColumnType::Real) => row.push_bind(None::<f64>),
        (Value::Null, ColumnType::Text) => row.push_bind(None::<String>),
    };
}

#[async_trait]
impl TableStore for PgStore {
    async fn replace_table(&self, name: &str, table: &Table) -> StoreResult<u64> {
        let relation = quote_ident(name);
        let column_defs = table
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = table
            .columns()
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await?;

        // CASCADE drops foreign keys left by the previous run
        sqlx::query(&format!("DROP TABLE IF EXISTS {} CASCADE", relation))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("CREATE TABLE {} ({})", relation, column_defs))
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        if table.num_columns() > 0 {
            let rows_per_batch = (MAX_BIND_PARAMS / table.num_columns()).max(1);

            for batch in table.rows().chunks(rows_per_batch) {
                let mut builder: QueryBuilder<Postgres> =
                    QueryBuilder::new(format!("INSERT INTO {} ({}) ", relation, column_list));
                builder.push_values(batch, |mut row, values| {
                    for (value, column) in values.iter().zip(table.columns()) {
                        push_value(&mut row, value, column.kind);
                    }
                });
                inserted += builder.build().execute(&mut *tx).await?.rows_affected();
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn add_primary_key(&self, table: &str, column: &str) -> StoreResult<()> {
        self.execute(&format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            quote_ident(table),
            quote_ident(&format!("{}_{}_pk", table, column)),
            quote_ident(column)
        ))
        .await?;
        Ok(())
    }

    async fn coerce_to_integer(&self, table: &str, column: &str) -> StoreResult<()> {
        let column = quote_ident(column);
        self.execute(&format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE BIGINT USING {}::numeric::bigint",
            quote_ident(table),
            column,
            column
        ))
        .await?;
        Ok(())
    }

    async fn ensure_key_row(&self, table: &str, column: &str, id: i64) -> StoreResult<bool> {
        let table = quote_ident(table);
        let column = quote_ident(column);
        let sql = format!(
            "INSERT INTO {table} ({column}) SELECT $1 \
             WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {column} = $1)"
        );
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_orphans(&self, relationship: &Relationship) -> StoreResult<Vec<i64>> {
        let sql = format!(
            "SELECT DISTINCT d.{dep_col} FROM {dep} d \
             WHERE d.{dep_col} IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM {refd} r WHERE r.{ref_col} = d.{dep_col}) \
             ORDER BY 1",
            dep = quote_ident(relationship.dependent_table),
            dep_col = quote_ident(relationship.dependent_column),
            refd = quote_ident(relationship.referenced_table),
            ref_col = quote_ident(relationship.referenced_column),
        );
        Ok(sqlx::query_scalar(&sql).fetch_all(&self.pool).await?)
    }

    async fn lowest_key(&self, table: &str, column: &str) -> StoreResult<Option<i64>> {
        let sql = format!("SELECT MIN({}) FROM {}", quote_ident(column), quote_ident(table));
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    async fn remap_orphans(&self, relationship: &Relationship, target: i64) -> StoreResult<u64> {
        let dep = quote_ident(relationship.dependent_table);
        let dep_col = quote_ident(relationship.dependent_column);
        let sql = format!(
            "UPDATE {dep} SET {dep_col} = $1 \
             WHERE {dep_col} IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM {refd} r WHERE r.{ref_col} = {dep}.{dep_col})",
            refd = quote_ident(relationship.referenced_table),
            ref_col = quote_ident(relationship.referenced_column),
        );
        let result = sqlx::query(&sql).bind(target).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn add_foreign_key(&self, relationship: &Relationship) -> StoreResult<()> {
        self.execute(&format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(relationship.dependent_table),
            quote_ident(&relationship.constraint_name()),
            quote_ident(relationship.dependent_column),
            quote_ident(relationship.referenced_table),
            quote_ident(relationship.referenced_column)
        ))
        .await?;
        Ok(())
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Store connection released");
        }
    }
}
