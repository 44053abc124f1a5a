//! CSV loader configuration.
//!
//! Loaded from YAML or built from defaults. The default delimiter can be
//! overridden with `SHADOWDB_CSV_DELIMITER`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::loader::LoaderError;

fn default_delimiter() -> char {
    std::env::var("SHADOWDB_CSV_DELIMITER")
        .ok()
        .and_then(|v| v.chars().next())
        .unwrap_or(',')
}

fn default_has_header() -> bool {
    true
}

/// Options controlling how CSV table files are split into cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvLoaderConfig {
    /// Cell separator
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// First non-blank line names the columns
    #[serde(default = "default_has_header")]
    pub has_header: bool,

    /// Trim whitespace around unquoted cells
    #[serde(default)]
    pub trim_cells: bool,
}

impl Default for CsvLoaderConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            has_header: default_has_header(),
            trim_cells: false,
        }
    }
}

impl CsvLoaderConfig {
    /// Load loader configuration from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// use shadowdb::loader::CsvLoaderConfig;
    ///
    /// let config = CsvLoaderConfig::load_from_file("config/csv_loader.yaml")?;
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoaderError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&contents)
    }

    /// Parse loader configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, LoaderError> {
        let config: CsvLoaderConfig = serde_yaml::from_str(contents)
            .map_err(|e| LoaderError::Config(format!("Failed to parse YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LoaderError> {
        if matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(LoaderError::Config(format!(
                "Delimiter {:?} is not allowed",
                self.delimiter
            )));
        }
        Ok(())
    }
}
