//! Ingestion orchestrator
//!
//! Drives one file family through read → normalize → materialize → assign key,
//! one file at a time in sorted name order, then runs the relationship
//! reconciler when the family asks for it. A failure stops only the file (or
//! constraint) it belongs to; every outcome is collected in an [`IngestReport`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabload_common::{LoadError, Result};
use tracing::{info, instrument, warn};

use crate::family::FilePolicy;
use crate::keys::KeyChoice;
use crate::normalize::NormalizeStats;
use crate::reader::TabularReader;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::store::TableStore;

/// Per-file pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Normalize,
    Materialize,
    AssignKey,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Read => write!(f, "read"),
            Stage::Normalize => write!(f, "normalize"),
            Stage::Materialize => write!(f, "materialize"),
            Stage::AssignKey => write!(f, "assign_key"),
        }
    }
}

/// Why a file did not load completely
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub stage: Stage,
    pub kind: &'static str,
    pub message: String,
}

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub table: Option<String>,
    pub rows: u64,
    pub normalize: Option<NormalizeStats>,
    pub primary_key: Option<KeyChoice>,
    pub error: Option<FileError>,
}

impl FileOutcome {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            table: None,
            rows: 0,
            normalize: None,
            primary_key: None,
            error: None,
        }
    }

    fn fail(mut self, stage: Stage, err: LoadError) -> Self {
        warn!(
            file = %self.path.display(),
            table = self.table.as_deref().unwrap_or("-"),
            stage = %stage,
            error = %err,
            "File failed; continuing with next file"
        );
        self.error = Some(FileError {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        });
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of one `ingest` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub family: &'static str,
    pub directory: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: Vec<FileOutcome>,
    pub reconcile: Option<ReconcileReport>,
}

impl IngestReport {
    pub fn processed(&self) -> usize {
        self.files.len()
    }

    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.processed() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &FileError)> + '_ {
        self.files
            .iter()
            .filter_map(|f| f.error.as_ref().map(|e| (f.path.as_path(), e)))
    }

    /// Get a summary message
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} ingestion of {}: {} processed, {} succeeded, {} failed",
            self.family,
            self.directory.display(),
            self.processed(),
            self.succeeded(),
            self.failed()
        );
        if let Some(reconcile) = &self.reconcile {
            summary.push_str(&format!(
                "; foreign keys {} installed, {} failed, {} rows remapped",
                reconcile.installed(),
                reconcile.failed(),
                reconcile.rows_remapped()
            ));
        }
        summary
    }
}

/// Ingestion pipeline for one file family over one store handle
pub struct IngestPipeline<P, S> {
    policy: P,
    store: S,
    reader: TabularReader,
    reconciler: Reconciler,
}

impl<P, S> IngestPipeline<P, S>
where
    P: FilePolicy,
    S: TableStore,
{
    pub fn new(policy: P, store: S) -> Self {
        let reader = TabularReader::new(policy.reader_options());
        Self {
            policy,
            store,
            reader,
            reconciler: Reconciler::default(),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Files of this family directly inside `dir`, sorted by name
    ///
    /// A missing directory yields an empty batch.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %dir.display(), "Input directory does not exist");
                return Ok(Vec::new());
            },
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(self.policy.extension()));
            if matches && path.is_file() {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Load every file of the family in `dir`, reconcile if required, release the store
    pub async fn ingest(&self, dir: &Path) -> Result<IngestReport> {
        let started_at = Utc::now();
        let files = match self.discover(dir) {
            Ok(files) => files,
            Err(e) => {
                self.store.close().await;
                return Err(e);
            },
        };

        info!(
            family = self.policy.label(),
            dir = %dir.display(),
            files = files.len(),
            "Starting ingestion"
        );

        let mut outcomes = Vec::with_capacity(files.len());
        for (index, path) in files.iter().enumerate() {
            info!("Processing file {} / {}: {}", index + 1, files.len(), path.display());
            outcomes.push(self.ingest_file(path).await);
        }

        let reconcile = if self.policy.reconciles() {
            Some(self.reconciler.run(&self.store).await)
        } else {
            None
        };

        self.store.close().await;

        let report = IngestReport {
            family: self.policy.label(),
            directory: dir.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            files: outcomes,
            reconcile,
        };
        info!("{}", report.summary());
        Ok(report)
    }

    /// Run one file through every per-file stage
    #[instrument(skip(self), fields(family = self.policy.label()))]
    pub async fn ingest_file(&self, path: &Path) -> FileOutcome {
        let mut outcome = FileOutcome::new(path);

        let table_name = match self.policy.table_name(path) {
            Ok(name) => name,
            Err(e) => return outcome.fail(Stage::Read, e),
        };
        outcome.table = Some(table_name.clone());

        let table = match self.reader.read(path) {
            Ok(table) => table,
            Err(e) => return outcome.fail(Stage::Read, e),
        };

        let (table, stats) = match self.policy.normalize(&table_name, table) {
            Ok(normalized) => normalized,
            Err(e) => return outcome.fail(Stage::Normalize, e),
        };
        outcome.normalize = Some(stats.clone());

        match self.store.replace_table(&table_name, &table).await {
            Ok(rows) => {
                outcome.rows = rows;
                info!(
                    file = %path.display(),
                    table = %table_name,
                    rows = rows,
                    "Table materialized"
                );
            },
            Err(e) => {
                let err = LoadError::materialization(&table_name, e.to_string());
                return outcome.fail(Stage::Materialize, err);
            },
        }

        let key = match self.policy.primary_key(&table_name, &table, &stats) {
            Ok(key) => key,
            Err(e) => return outcome.fail(Stage::AssignKey, e),
        };
        drop(table);

        match self.store.add_primary_key(&table_name, key.column()).await {
            Ok(()) => {
                info!(table = %table_name, column = key.column(), "Primary key installed");
                outcome.primary_key = Some(key);
                outcome
            },
            Err(e) => {
                let err = LoadError::constraint(&table_name, key.column(), e.to_string());
                outcome.fail(Stage::AssignKey, err)
            },
        }
    }

    /// Release the store; safe to call after `ingest` already did
    pub async fn close(&self) {
        self.store.close().await;
    }
}
