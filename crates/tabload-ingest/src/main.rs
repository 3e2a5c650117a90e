//! tabload - flat-file loader

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tabload_common::logging::{init_logging, LogConfig, LogLevel};
use tabload_ingest::config::LoaderConfig;
use tabload_ingest::pipeline::{IngestPipeline, IngestReport};
use tabload_ingest::reconcile::{OrphanPolicy, Reconciler};
use tabload_ingest::relations::RelationshipGraph;
use tabload_ingest::{CsvFamily, FilePolicy, PgStore, TxtFamily};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tabload")]
#[command(author, version, about = "Load directories of CSV/TXT files into PostgreSQL")]
struct Cli {
    /// File family to load
    #[command(subcommand)]
    family: Family,

    /// INI credentials file with a [DB] section
    #[arg(short, long, global = true, env = "TABLOAD_CREDENTIALS")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Family {
    /// Load comma-delimited files and reconcile foreign keys
    Csv {
        /// Input directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Load tab-delimited files
    Txt {
        /// Input directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Load CSV files, then TXT files
    All {
        /// CSV input directory
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        /// TXT input directory
        #[arg(long)]
        txt_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("tabload")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        },
    };

    match run(cli).await {
        Ok(()) => {
            info!("Ingestion complete");
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!(error = %format!("{:#}", e), "Ingestion aborted");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = LoaderConfig::load(cli.config.as_deref())?;
    info!(database = %config.database.redacted_url(), "Configuration loaded");

    let default_dir = |configured: &Option<PathBuf>| {
        configured.clone().unwrap_or_else(|| PathBuf::from("."))
    };

    match cli.family {
        Family::Csv { dir } => {
            let dir = dir.unwrap_or_else(|| default_dir(&config.csv_dir));
            load_family(&config, CsvFamily, &dir).await?;
        },
        Family::Txt { dir } => {
            let dir = dir.unwrap_or_else(|| default_dir(&config.txt_dir));
            load_family(&config, TxtFamily::new(&config.txt_null_token), &dir).await?;
        },
        Family::All { csv_dir, txt_dir } => {
            let csv_dir = csv_dir.unwrap_or_else(|| default_dir(&config.csv_dir));
            let txt_dir = txt_dir.unwrap_or_else(|| default_dir(&config.txt_dir));
            load_family(&config, CsvFamily, &csv_dir).await?;
            load_family(&config, TxtFamily::new(&config.txt_null_token), &txt_dir).await?;
        },
    }

    Ok(())
}

/// Connect, ingest one family, release the connection
///
/// Only a failed connection (or an unreadable directory) is returned as an
/// error; per-file and per-constraint failures end up in the report.
async fn load_family<P: FilePolicy>(config: &LoaderConfig, policy: P, dir: &Path) -> Result<()> {
    let store = PgStore::connect(&config.database).await?;

    let orphans = match config.orphan_target {
        Some(id) => OrphanPolicy::RemapTo(id),
        None => OrphanPolicy::RemapToLowest,
    };
    let reconciler = Reconciler::new(RelationshipGraph::default(), orphans);

    let pipeline = IngestPipeline::new(policy, store).with_reconciler(reconciler);
    let result = pipeline.ingest(dir).await;
    pipeline.close().await;

    let report = result?;
    log_report(&report);
    Ok(())
}

fn log_report(report: &IngestReport) {
    for (path, err) in report.failures() {
        warn!(
            file = %path.display(),
            stage = %err.stage,
            error = %err.message,
            "File not fully loaded"
        );
    }

    if let Some(reconcile) = &report.reconcile {
        for constraint in reconcile.constraints.iter().filter(|c| !c.is_installed()) {
            warn!(
                relationship = %constraint.relationship,
                error = constraint.error.as_deref().unwrap_or_default(),
                "Foreign key not installed"
            );
        }
    }

    match serde_json::to_string(report) {
        Ok(json) => info!(report = %json, "{}", report.summary()),
        Err(e) => warn!(error = %e, "{}", report.summary()),
    }
}
