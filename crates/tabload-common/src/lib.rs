//! tabload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the tabload workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the [`LoadError`] taxonomy and [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//!
//! # Example
//!
//! ```no_run
//! use tabload_common::{LoadError, Result};
//!
//! fn table_name(stem: &str) -> Result<String> {
//!     if stem.is_empty() {
//!         return Err(LoadError::parse(stem, "empty file stem"));
//!     }
//!     Ok(stem.to_lowercase())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{LoadError, Result};
