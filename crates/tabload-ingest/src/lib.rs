//! tabload Ingest Library
//!
//! Batch loader for directories of delimited flat files into PostgreSQL.
//!
//! # File Families
//!
//! - **CSV**: comma-delimited, one table per file stem, `id` primary key, and a
//!   fixed foreign-key graph reconciled after the batch
//! - **TXT**: tab-delimited, table named from the file name tail, lowercased
//!   text, `np_id` natural key or a generated `custom_id`
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use tabload_ingest::config::LoaderConfig;
//! use tabload_ingest::family::CsvFamily;
//! use tabload_ingest::pipeline::IngestPipeline;
//! use tabload_ingest::store::PgStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LoaderConfig::load(None)?;
//!     let store = PgStore::connect(&config.database).await?;
//!
//!     let pipeline = IngestPipeline::new(CsvFamily, store);
//!     let report = pipeline.ingest(Path::new("./data/csv")).await?;
//!     tracing::info!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod family;
pub mod keys;
pub mod normalize;
pub mod pipeline;
pub mod reader;
pub mod reconcile;
pub mod relations;
pub mod store;
pub mod table;

pub use family::{CsvFamily, FilePolicy, TxtFamily};
pub use pipeline::{IngestPipeline, IngestReport};
pub use reconcile::{OrphanPolicy, Reconciler};
pub use store::{PgStore, TableStore};
