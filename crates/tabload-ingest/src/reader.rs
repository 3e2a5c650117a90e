//! Tabular reader for delimited flat files
//!
//! Parses comma- or tab-delimited text into a typed [`Table`]. Null tokens are
//! resolved while records are read, before column types are classified.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use tabload_common::{LoadError, Result};
use tracing::debug;

use crate::table::Table;

/// Cell contents treated as missing by default
///
/// Matches the usual dataframe conventions; the empty string is always missing.
pub const DEFAULT_NULL_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Parsing options for one file family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    pub delimiter: u8,
    pub null_tokens: Vec<String>,
}

impl ReaderOptions {
    /// Comma-delimited with the default null tokens
    pub fn comma() -> Self {
        Self {
            delimiter: b',',
            null_tokens: DEFAULT_NULL_TOKENS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Tab-delimited with the default null tokens
    pub fn tab() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::comma()
        }
    }

    /// Add a sentinel string recognized as missing
    pub fn with_null_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        if !self.null_tokens.contains(&token) {
            self.null_tokens.push(token);
        }
        self
    }
}

/// Reads flat files into in-memory tables
pub struct TabularReader {
    delimiter: u8,
    null_tokens: HashSet<String>,
}

impl TabularReader {
    pub fn new(options: ReaderOptions) -> Self {
        Self {
            delimiter: options.delimiter,
            null_tokens: options.null_tokens.into_iter().collect(),
        }
    }

    /// Read a file from disk
    pub fn read(&self, path: &Path) -> Result<Table> {
        let file = File::open(path)
            .map_err(|e| LoadError::parse(path, format!("cannot open file: {}", e)))?;
        self.read_from(file, path)
    }

    /// Read from any byte source; `origin` only labels errors
    pub fn read_from<R: Read>(&self, source: R, origin: &Path) -> Result<Table> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers = self.headers(&mut reader, origin)?;

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| LoadError::parse(origin, e.to_string()))?;

            // Short records are padded with missing values; long ones cannot be placed
            if record.len() > headers.len() {
                let line = record.position().map_or(0, |p| p.line());
                return Err(LoadError::parse(
                    origin,
                    format!(
                        "record on line {} has {} fields, but the header has {}",
                        line,
                        record.len(),
                        headers.len()
                    ),
                ));
            }

            let mut cells: Vec<Option<String>> = record
                .iter()
                .map(|cell| (!self.is_null(cell)).then(|| cell.to_string()))
                .collect();
            cells.resize(headers.len(), None);
            records.push(cells);
        }

        debug!(
            file = %origin.display(),
            columns = headers.len(),
            rows = records.len(),
            "Parsed flat file"
        );

        Table::from_raw(headers, records).map_err(|e| LoadError::parse(origin, e.to_string()))
    }

    fn headers<R: Read>(&self, reader: &mut csv::Reader<R>, origin: &Path) -> Result<Vec<String>> {
        let record = reader
            .headers()
            .map_err(|e| LoadError::parse(origin, e.to_string()))?;

        if record.is_empty() {
            return Err(LoadError::parse(origin, "no header row"));
        }

        let mut seen = HashSet::new();
        let mut headers = Vec::with_capacity(record.len());
        for (idx, name) in record.iter().enumerate() {
            let name = match name.trim() {
                "" => format!("unnamed_{}", idx),
                trimmed => trimmed.to_string(),
            };
            if !seen.insert(name.clone()) {
                return Err(LoadError::parse(
                    origin,
                    format!("duplicate column name '{}'", name),
                ));
            }
            headers.push(name);
        }

        Ok(headers)
    }

    fn is_null(&self, cell: &str) -> bool {
        cell.is_empty() || self.null_tokens.contains(cell)
    }
}
