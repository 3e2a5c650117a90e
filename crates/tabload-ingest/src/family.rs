//! File-family policies
//!
//! The CSV and TXT families share the pipeline shape but differ in parsing,
//! table naming, normalization and primary-key selection. Each family is a
//! named [`FilePolicy`] implementation rather than a flag threaded through a
//! single code path.

use std::path::Path;

use tabload_common::{LoadError, Result};

use crate::keys::{self, KeyChoice, KeyColumns};
use crate::normalize::{self, NormalizeStats};
use crate::reader::ReaderOptions;
use crate::table::Table;

/// Per-family ingestion rules
pub trait FilePolicy: Send + Sync {
    /// Short label used in logs and reports
    fn label(&self) -> &'static str;

    /// File extension (without dot) selecting this family's inputs
    fn extension(&self) -> &'static str;

    /// Derive the target table name from a file path
    fn table_name(&self, path: &Path) -> Result<String>;

    fn reader_options(&self) -> ReaderOptions;

    fn normalize(&self, table_name: &str, table: Table) -> Result<(Table, NormalizeStats)>;

    /// Pick the primary-key column of a normalized table
    ///
    /// `stats` is what this family's `normalize` returned for `table`.
    fn primary_key(&self, table_name: &str, table: &Table, stats: &NormalizeStats) -> Result<KeyChoice>;

    /// Whether the relationship reconciler runs after this family's batch
    fn reconciles(&self) -> bool;
}

fn lowercase_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_lowercase)
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| LoadError::parse(path, "file name has no usable stem"))
}

/// Comma-delimited files: table per file stem, fixed `id` primary key
#[derive(Debug, Clone, Default)]
pub struct CsvFamily;

impl CsvFamily {
    pub const PRIMARY_KEY: &'static str = "id";
}

impl FilePolicy for CsvFamily {
    fn label(&self) -> &'static str {
        "csv"
    }

    fn extension(&self) -> &'static str {
        "csv"
    }

    fn table_name(&self, path: &Path) -> Result<String> {
        lowercase_stem(path)
    }

    fn reader_options(&self) -> ReaderOptions {
        ReaderOptions::comma()
    }

    fn normalize(&self, _table_name: &str, table: Table) -> Result<(Table, NormalizeStats)> {
        Ok(normalize::normalize_csv(table))
    }

    // No fallback: a missing or duplicated `id` surfaces as a constraint failure
    fn primary_key(&self, _table_name: &str, _table: &Table, _stats: &NormalizeStats) -> Result<KeyChoice> {
        Ok(KeyChoice::Natural(Self::PRIMARY_KEY.to_string()))
    }

    fn reconciles(&self) -> bool {
        true
    }
}

/// Tab-separated files: prefixed file names, lowercased text, natural-or-synthetic key
#[derive(Debug, Clone)]
pub struct TxtFamily {
    null_token: String,
    keys: KeyColumns,
    skipped_name_tokens: usize,
}

impl TxtFamily {
    pub const NULL_TOKEN: &'static str = "n.a.";
    pub const NATURAL_KEY: &'static str = "np_id";
    pub const SYNTHETIC_KEY: &'static str = "custom_id";
    pub const SKIPPED_NAME_TOKENS: usize = 3;

    pub fn new(null_token: impl Into<String>) -> Self {
        Self {
            null_token: null_token.into(),
            keys: KeyColumns::new(Self::NATURAL_KEY, Self::SYNTHETIC_KEY),
            skipped_name_tokens: Self::SKIPPED_NAME_TOKENS,
        }
    }
}

impl Default for TxtFamily {
    fn default() -> Self {
        Self::new(Self::NULL_TOKEN)
    }
}

impl FilePolicy for TxtFamily {
    fn label(&self) -> &'static str {
        "txt"
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    /// `NPASS_v2_naturalproducts_species_pair.txt` → `speciespair`
    fn table_name(&self, path: &Path) -> Result<String> {
        let stem = lowercase_stem(path)?;
        let name: String = stem.split('_').skip(self.skipped_name_tokens).collect();

        if name.is_empty() {
            return Err(LoadError::parse(
                path,
                format!(
                    "file name needs more than {} underscore-separated tokens",
                    self.skipped_name_tokens
                ),
            ));
        }
        Ok(name)
    }

    fn reader_options(&self) -> ReaderOptions {
        ReaderOptions::tab().with_null_token(self.null_token.clone())
    }

    fn normalize(&self, table_name: &str, table: Table) -> Result<(Table, NormalizeStats)> {
        normalize::normalize_txt(table, &self.keys)
            .map_err(|e| LoadError::normalization(table_name, e.to_string()))
    }

    // The key follows the normalizer's decision; a source column that merely
    // carries the synthetic name is ordinary data
    fn primary_key(&self, table_name: &str, table: &Table, stats: &NormalizeStats) -> Result<KeyChoice> {
        let resolved = keys::resolve_key(table, &self.keys, stats.synthetic_key_added);
        match (resolved, &stats.key) {
            (Some(key), Some(decided)) if key == *decided => Ok(key),
            (Some(key), _) => Err(LoadError::constraint(
                table_name,
                key.column(),
                "key column does not match the normalized table",
            )),
            (None, _) => Err(LoadError::constraint(
                table_name,
                &self.keys.natural,
                "neither natural nor synthetic key column qualifies",
            )),
        }
    }

    fn reconciles(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_table_name_is_lowercased_stem() {
        let name = CsvFamily.table_name(Path::new("/data/naeb_dump/Use_SubCategories.csv"));
        assert_eq!(name.unwrap(), "use_subcategories");
    }

    #[test]
    fn test_txt_table_name_drops_three_tokens() {
        let family = TxtFamily::default();
        assert_eq!(family.table_name(Path::new("x_y_z_plants.txt")).unwrap(), "plants");
        assert_eq!(
            family
                .table_name(Path::new("NPASS_v2_naturalproducts_Species_Pair.txt"))
                .unwrap(),
            "speciespair"
        );
    }

    #[test]
    fn test_txt_table_name_with_too_few_tokens_fails() {
        let err = TxtFamily::default()
            .table_name(Path::new("a_b_c.txt"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn test_reader_options_per_family() {
        assert_eq!(CsvFamily.reader_options().delimiter, b',');
        assert!(!CsvFamily.reader_options().null_tokens.contains(&"n.a.".to_string()));

        let txt = TxtFamily::default().reader_options();
        assert_eq!(txt.delimiter, b'\t');
        assert!(txt.null_tokens.contains(&"n.a.".to_string()));
    }

    #[test]
    fn test_txt_key_follows_normalizer_decision() {
        let family = TxtFamily::default();
        let table = Table::from_raw(
            vec!["np_id".into(), "custom_id".into()],
            vec![
                vec![Some("NPC1".into()), Some("1".into())],
                vec![Some("NPC2".into()), Some("1".into())],
            ],
        )
        .unwrap();

        let (table, stats) = family.normalize("pairs", table).unwrap();
        let key = family.primary_key("pairs", &table, &stats).unwrap();
        assert_eq!(key, KeyChoice::Natural("np_id".into()));
    }

    #[test]
    fn test_txt_key_disagreeing_with_stats_is_constraint_error() {
        let family = TxtFamily::default();
        let table = Table::from_raw(vec!["np_id".into()], vec![vec![Some("NPC1".into())]]).unwrap();
        let (table, mut stats) = family.normalize("plants", table).unwrap();
        stats.key = Some(KeyChoice::Synthetic("custom_id".into()));

        let err = family.primary_key("plants", &table, &stats).unwrap_err();
        assert_eq!(err.kind(), "constraint");
    }

    #[test]
    fn test_only_csv_reconciles() {
        assert!(CsvFamily.reconciles());
        assert!(!TxtFamily::default().reconciles());
    }
}
