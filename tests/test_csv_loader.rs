//! Tests for CSV loader configuration and pluggable value conversion

use std::fs;
use std::sync::Arc;

use shadowdb::conversion::{convert, FormatError};
use shadowdb::{
    ColumnDescription, CsvDataLoader, CsvLoaderConfig, DataLoader, FieldType, LoaderError,
    TableDescription, Value,
};

fn readings_table() -> TableDescription {
    TableDescription::new(
        "Readings",
        vec![
            ColumnDescription::new("Sensor", FieldType::String),
            ColumnDescription::new("Uptime", FieldType::TimeSpan),
            ColumnDescription::new("Reading", FieldType::Double),
        ],
    )
}

#[test]
fn test_yaml_config_drives_splitting() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("Readings.csv"),
        "Sensor ; Uptime ; Reading\n a-1 ; 1.02:03:04 ; 0.5 \n",
    )
    .unwrap();

    let config_path = dir.path().join("csv_loader.yaml");
    fs::write(&config_path, "delimiter: ';'\ntrim_cells: true\n").unwrap();
    let config = CsvLoaderConfig::load_from_file(&config_path).unwrap();

    let factory = CsvDataLoader::new(dir.path().to_string_lossy())
        .with_config(config)
        .create_table_data_loader_factory()
        .unwrap();

    let rows: Vec<Vec<Value>> = factory
        .create_table_data_loader(&readings_table())
        .get_data()
        .collect::<Result<_, _>>()
        .unwrap();

    let uptime = chrono::Duration::days(1)
        + chrono::Duration::hours(2)
        + chrono::Duration::minutes(3)
        + chrono::Duration::seconds(4);
    assert_eq!(
        rows,
        vec![vec![Value::from("a-1"), Value::TimeSpan(uptime), Value::Double(0.5)]]
    );
}

#[test]
fn test_invalid_config_is_rejected_before_resolving() {
    let dir = tempfile::tempdir().unwrap();
    let config = CsvLoaderConfig {
        delimiter: '"',
        has_header: true,
        trim_cells: false,
    };

    let result = CsvDataLoader::new(dir.path().to_string_lossy())
        .with_config(config)
        .create_table_data_loader_factory();

    assert!(matches!(result, Err(LoaderError::Config(_))));
}

#[test]
fn test_custom_converter() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Readings.csv"), "Sensor,Uptime,Reading\nb,,n/a\n").unwrap();

    // treat "n/a" as null, defer everything else to the default rules
    let converter = |token: Option<&str>, ty: &FieldType| -> Result<Value, FormatError> {
        match token {
            Some("n/a") => Ok(Value::Null),
            other => convert(other, ty),
        }
    };

    let factory = CsvDataLoader::new(dir.path().to_string_lossy())
        .with_config(CsvLoaderConfig {
            delimiter: ',',
            has_header: true,
            trim_cells: false,
        })
        .with_converter(Arc::new(converter))
        .create_table_data_loader_factory()
        .unwrap();

    let rows: Vec<Vec<Value>> = factory
        .create_table_data_loader(&readings_table())
        .get_data()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows, vec![vec![Value::from("b"), Value::Null, Value::Null]]);
}

#[test]
fn test_bad_escape_surfaces_as_loader_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Readings.csv"), "Sensor\nbad\\q\nok\n").unwrap();

    let factory = CsvDataLoader::new(dir.path().to_string_lossy())
        .with_config(CsvLoaderConfig {
            delimiter: ',',
            has_header: true,
            trim_cells: false,
        })
        .create_table_data_loader_factory()
        .unwrap();

    let table = TableDescription::new(
        "Readings",
        vec![ColumnDescription::new("Sensor", FieldType::String)],
    );
    let rows: Vec<_> = factory.create_table_data_loader(&table).get_data().collect();

    assert_eq!(rows.len(), 2);
    match &rows[0] {
        Err(err @ LoaderError::Conversion { .. }) => {
            assert!(err.to_string().contains("\\q"), "unexpected message: {}", err);
        }
        other => panic!("expected conversion error, got {:?}", other),
    }
    assert_eq!(rows[1].as_ref().unwrap(), &vec![Value::from("ok")]);
}

#[test]
fn test_malformed_row() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Readings.csv"), "Sensor\n\"unterminated\n").unwrap();

    let factory = CsvDataLoader::new(dir.path().to_string_lossy())
        .create_table_data_loader_factory()
        .unwrap();

    let table = TableDescription::new(
        "Readings",
        vec![ColumnDescription::new("Sensor", FieldType::String)],
    );
    let first = factory.create_table_data_loader(&table).get_data().next().unwrap();

    assert!(matches!(first, Err(LoaderError::MalformedRow { line: 2, .. })));
}
