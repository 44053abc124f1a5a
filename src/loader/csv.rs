//! CSV-backed table data.
//!
//! The source location is a directory (optionally `file://` prefixed); table
//! `T` is read from `T.csv`. Cells are split on the configured delimiter with
//! double-quote quoting. An unquoted empty cell is null; a quoted cell is
//! always a string token, so `""` is the empty string. String tokens use the
//! escape grammar of [`CsvValueConverter`].

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Lines};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::conversion::{CsvValueConverter, ValueConverter};
use crate::loader::{
    CsvLoaderConfig, DataLoader, LoaderError, RowIter, TableDataLoader, TableDataLoaderFactory,
    TableDescription,
};
use crate::value::Value;

/// Data loader reading one CSV file per table from a directory.
pub struct CsvDataLoader {
    location: String,
    config: CsvLoaderConfig,
    converter: Arc<dyn ValueConverter>,
}

impl CsvDataLoader {
    /// Create a loader for `location`. Nothing is resolved until
    /// [`DataLoader::create_table_data_loader_factory`] is called.
    ///
    /// # Example
    /// ```ignore
    /// use shadowdb::loader::{CsvDataLoader, DataLoader};
    ///
    /// let loader = CsvDataLoader::new("file:///var/data/tables");
    /// let factory = loader.create_table_data_loader_factory()?;
    /// ```
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            config: CsvLoaderConfig::default(),
            converter: Arc::new(CsvValueConverter::new()),
        }
    }

    pub fn with_config(mut self, config: CsvLoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl DataLoader for CsvDataLoader {
    fn create_table_data_loader_factory(
        &self,
    ) -> Result<Box<dyn TableDataLoaderFactory>, LoaderError> {
        self.config.validate()?;
        let directory = resolve_location(&self.location)?;

        tracing::info!("Opened CSV data source at {}", directory.display());

        Ok(Box::new(CsvTableDataLoaderFactory {
            directory,
            config: self.config.clone(),
            converter: Arc::clone(&self.converter),
        }))
    }
}

fn resolve_location(location: &str) -> Result<PathBuf, LoaderError> {
    let raw = location.strip_prefix("file://").unwrap_or(location);

    if raw.trim().is_empty() {
        return Err(LoaderError::InvalidLocation {
            location: location.to_string(),
            reason: "location is empty".to_string(),
        });
    }

    let path = Path::new(raw);
    if !path.is_dir() {
        return Err(LoaderError::InvalidLocation {
            location: location.to_string(),
            reason: "not an existing directory".to_string(),
        });
    }

    Ok(path.to_path_buf())
}

/// Factory bound to a resolved CSV directory.
pub struct CsvTableDataLoaderFactory {
    directory: PathBuf,
    config: CsvLoaderConfig,
    converter: Arc<dyn ValueConverter>,
}

impl CsvTableDataLoaderFactory {
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl TableDataLoaderFactory for CsvTableDataLoaderFactory {
    fn create_table_data_loader(&self, table: &TableDescription) -> Box<dyn TableDataLoader> {
        Box::new(CsvTableDataLoader {
            path: self.directory.join(format!("{}.csv", table.name())),
            table: table.clone(),
            config: self.config.clone(),
            converter: Arc::clone(&self.converter),
        })
    }
}

/// Rows of one table, read from its CSV file.
pub struct CsvTableDataLoader {
    path: PathBuf,
    table: TableDescription,
    config: CsvLoaderConfig,
    converter: Arc<dyn ValueConverter>,
}

impl CsvTableDataLoader {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableDataLoader for CsvTableDataLoader {
    fn get_data(&self) -> RowIter {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    "No data for table '{}' ({} not found)",
                    self.table.name(),
                    self.path.display()
                );
                return Box::new(std::iter::empty());
            }
            Err(e) => {
                return Box::new(std::iter::once(Err(LoaderError::Io {
                    path: self.path.clone(),
                    source: e,
                })))
            }
        };

        Box::new(CsvRows {
            path: self.path.clone(),
            table: self.table.clone(),
            config: self.config.clone(),
            converter: Arc::clone(&self.converter),
            lines: BufReader::new(file).lines(),
            line: 0,
            mapping: None,
            width: self.table.columns().len(),
            finished: false,
        })
    }

    fn table(&self) -> &TableDescription {
        &self.table
    }
}

struct CsvRows {
    path: PathBuf,
    table: TableDescription,
    config: CsvLoaderConfig,
    converter: Arc<dyn ValueConverter>,
    lines: Lines<BufReader<File>>,
    line: usize,
    /// column index -> cell index, resolved from the header
    mapping: Option<Vec<Option<usize>>>,
    /// expected cell count per row
    width: usize,
    finished: bool,
}

impl CsvRows {
    fn map_header(&mut self, header: &[Option<String>]) -> Vec<Option<usize>> {
        let names: Vec<&str> = header
            .iter()
            .map(|cell| cell.as_deref().map(str::trim).unwrap_or(""))
            .collect();

        self.width = header.len();

        self.table
            .columns()
            .iter()
            .map(|column| {
                let index = names
                    .iter()
                    .position(|n| *n == column.name())
                    .or_else(|| names.iter().position(|n| n.eq_ignore_ascii_case(column.name())));
                if index.is_none() {
                    tracing::debug!(
                        "Column '{}' missing from {}, loading as null",
                        column.name(),
                        self.path.display()
                    );
                }
                index
            })
            .collect()
    }

    fn materialize(
        &self,
        mapping: &[Option<usize>],
        cells: &[Option<String>],
    ) -> Result<Vec<Value>, LoaderError> {
        if cells.len() != self.width {
            tracing::warn!(
                "Table '{}' line {}: {} cells, expected {}",
                self.table.name(),
                self.line,
                cells.len(),
                self.width
            );
        }

        self.table
            .columns()
            .iter()
            .zip(mapping)
            .map(|(column, &index)| {
                let token = index
                    .and_then(|i| cells.get(i))
                    .and_then(|cell| cell.as_deref());

                self.converter
                    .convert_value(token, column.field_type())
                    .map_err(|source| LoaderError::Conversion {
                        table: self.table.name().to_string(),
                        column: column.name().to_string(),
                        line: self.line,
                        source,
                    })
            })
            .collect()
    }
}

impl Iterator for CsvRows {
    type Item = Result<Vec<Value>, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let mut text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(LoaderError::Io {
                        path: self.path.clone(),
                        source: e,
                    }));
                }
            };
            self.line += 1;

            if self.line == 1 && text.starts_with('\u{FEFF}') {
                text.remove(0);
            }

            if text.trim().is_empty() {
                continue;
            }

            let cells = match split_record(&text, &self.config) {
                Ok(cells) => cells,
                Err(reason) => {
                    return Some(Err(LoaderError::MalformedRow {
                        table: self.table.name().to_string(),
                        line: self.line,
                        reason,
                    }))
                }
            };

            let mapping = match self.mapping.take() {
                Some(mapping) => mapping,
                None if self.config.has_header => {
                    let mapping = self.map_header(&cells);
                    self.mapping = Some(mapping);
                    continue;
                }
                None => (0..self.table.columns().len()).map(Some).collect(),
            };

            let row = self.materialize(&mapping, &cells);
            self.mapping = Some(mapping);
            return Some(row);
        }
    }
}

/// Split one CSV line into cells. `None` marks an unquoted empty cell.
fn split_record(line: &str, config: &CsvLoaderConfig) -> Result<Vec<Option<String>>, String> {
    let delimiter = config.delimiter;
    let mut cells = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut cell = String::new();

            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        cell.push('"');
                    }
                    Some('"') => break,
                    Some(c) => cell.push(c),
                    None => return Err("unterminated quoted cell".to_string()),
                }
            }

            cells.push(Some(cell));
            match chars.next() {
                None => break,
                Some(c) if c == delimiter => continue,
                Some(c) => return Err(format!("unexpected '{}' after closing quote", c)),
            }
        }

        let mut cell = String::new();
        let mut last = true;
        for c in chars.by_ref() {
            if c == delimiter {
                last = false;
                break;
            }
            cell.push(c);
        }

        let cell = if config.trim_cells {
            cell.trim().to_string()
        } else {
            cell
        };
        cells.push(if cell.is_empty() { None } else { Some(cell) });

        if last {
            break;
        }
    }

    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ColumnDescription;
    use crate::types::FieldType;
    use std::fs;

    fn config() -> CsvLoaderConfig {
        CsvLoaderConfig {
            delimiter: ',',
            has_header: true,
            trim_cells: false,
        }
    }

    #[test]
    fn test_split_record_quoting() {
        let cells = split_record(r#"1,"a,b","",,"say ""hi""""#, &config()).unwrap();

        assert_eq!(
            cells,
            vec![
                Some("1".to_string()),
                Some("a,b".to_string()),
                Some(String::new()),
                None,
                Some("say \"hi\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_split_record_trailing_delimiter() {
        let cells = split_record("a,", &config()).unwrap();
        assert_eq!(cells, vec![Some("a".to_string()), None]);
    }

    #[test]
    fn test_split_record_errors() {
        assert!(split_record(r#""open"#, &config()).is_err());
        assert!(split_record(r#""a"b"#, &config()).is_err());
    }

    #[test]
    fn test_split_record_trim() {
        let mut cfg = config();
        cfg.trim_cells = true;
        cfg.delimiter = ';';

        let cells = split_record(" 1 ; x ;  ", &cfg).unwrap();
        assert_eq!(cells, vec![Some("1".to_string()), Some("x".to_string()), None]);
    }

    #[test]
    fn test_header_maps_columns_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("People.csv"), "Name,Id\nAnn,1\n\"\",2\n,3\n").unwrap();

        let factory = CsvDataLoader::new(dir.path().to_string_lossy())
            .with_config(config())
            .create_table_data_loader_factory()
            .unwrap();
        let table = TableDescription::new(
            "People",
            vec![
                ColumnDescription::new("Id", FieldType::Int32),
                ColumnDescription::new("Name", FieldType::String),
                ColumnDescription::new("Missing", FieldType::Guid),
            ],
        );

        let rows: Vec<Vec<Value>> = factory
            .create_table_data_loader(&table)
            .get_data()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            rows,
            vec![
                vec![Value::Int32(1), Value::from("Ann"), Value::Null],
                vec![Value::Int32(2), Value::from(""), Value::Null],
                vec![Value::Int32(3), Value::Null, Value::Null],
            ]
        );
    }

    #[test]
    fn test_byte_order_mark_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Foo.csv"), "\u{FEFF}Id,Value\n1,Foo\n").unwrap();

        let factory = CsvDataLoader::new(dir.path().to_string_lossy())
            .with_config(config())
            .create_table_data_loader_factory()
            .unwrap();
        let table = TableDescription::new(
            "Foo",
            vec![
                ColumnDescription::new("Id", FieldType::Int32),
                ColumnDescription::new("Value", FieldType::String),
            ],
        );

        let rows: Vec<Vec<Value>> = factory
            .create_table_data_loader(&table)
            .get_data()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows, vec![vec![Value::Int32(1), Value::from("Foo")]]);
    }

    #[test]
    fn test_conversion_failure_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Bad.csv"), "Id\nx\n").unwrap();

        let factory = CsvDataLoader::new(dir.path().to_string_lossy())
            .with_config(config())
            .create_table_data_loader_factory()
            .unwrap();
        let table =
            TableDescription::new("Bad", vec![ColumnDescription::new("Id", FieldType::Int32)]);

        let first = factory
            .create_table_data_loader(&table)
            .get_data()
            .next()
            .unwrap();

        match first {
            Err(LoaderError::Conversion { column, line, source, .. }) => {
                assert_eq!(column, "Id");
                assert_eq!(line, 2);
                assert_eq!(source.token(), "x");
            }
            other => panic!("expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_without_header_maps_by_position() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("T.csv"), "5,five\n").unwrap();

        let mut cfg = config();
        cfg.has_header = false;
        let factory = CsvDataLoader::new(format!("file://{}", dir.path().display()))
            .with_config(cfg)
            .create_table_data_loader_factory()
            .unwrap();
        let table = TableDescription::new(
            "T",
            vec![
                ColumnDescription::new("N", FieldType::Int64),
                ColumnDescription::new("S", FieldType::String),
            ],
        );

        let rows: Vec<_> = factory.create_table_data_loader(&table).get_data().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap(), &vec![Value::Int64(5), Value::from("five")]);
    }
}
