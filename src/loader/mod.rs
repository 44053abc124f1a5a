//! Table data loading.
//!
//! A [`DataLoader`] resolves its source location once, when the factory is
//! created; the factory then hands out one [`TableDataLoader`] per table. Rows
//! come back as positional [`Value`]s aligned with the table's columns.

pub mod config;
pub mod csv;
pub mod description;

use std::fmt;
use std::path::PathBuf;

use crate::conversion::FormatError;
use crate::value::Value;

// Re-export key types
pub use config::CsvLoaderConfig;
pub use csv::{CsvDataLoader, CsvTableDataLoader, CsvTableDataLoaderFactory};
pub use description::{ColumnDescription, TableDescription};

/// Error type for loader operations
#[derive(Debug)]
pub enum LoaderError {
    /// The source location cannot be resolved (argument error)
    InvalidLocation {
        location: String,
        reason: String,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    MalformedRow {
        table: String,
        line: usize,
        reason: String,
    },
    Conversion {
        table: String,
        column: String,
        line: usize,
        source: FormatError,
    },
    Config(String),
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderError::InvalidLocation { location, reason } => {
                write!(f, "Invalid data source location '{}': {}", location, reason)
            }
            LoaderError::Io { path, source } => {
                write!(f, "IO error reading {}: {}", path.display(), source)
            }
            LoaderError::MalformedRow { table, line, reason } => {
                write!(f, "Malformed row in table '{}' at line {}: {}", table, line, reason)
            }
            LoaderError::Conversion {
                table,
                column,
                line,
                source,
            } => write!(
                f,
                "Table '{}', column '{}', line {}: {}",
                table, column, line, source
            ),
            LoaderError::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoaderError::Io { source, .. } => Some(source),
            LoaderError::Conversion { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Rows of one table. Each item is one row or an error for that line.
///
/// Conversion and malformed-row errors skip only the offending line; an I/O
/// error ends the iterator.
pub type RowIter = Box<dyn Iterator<Item = Result<Vec<Value>, LoaderError>>>;

/// Entry point of a data source.
pub trait DataLoader {
    /// Resolve the source location and create the per-table factory.
    ///
    /// # Errors
    /// `LoaderError::InvalidLocation` when the location cannot be resolved.
    fn create_table_data_loader_factory(
        &self,
    ) -> Result<Box<dyn TableDataLoaderFactory>, LoaderError>;
}

/// Creates table loaders against an already-resolved source.
pub trait TableDataLoaderFactory: Send + Sync {
    fn create_table_data_loader(&self, table: &TableDescription) -> Box<dyn TableDataLoader>;
}

/// Reads the rows of one table.
pub trait TableDataLoader: Send + Sync {
    /// Lazily read the rows. Every call starts again from the first row.
    ///
    /// A table absent from the source yields no rows.
    fn get_data(&self) -> RowIter;

    fn table(&self) -> &TableDescription;
}
