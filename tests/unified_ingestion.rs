use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use subscriber_etl::ingestion::unified::resolve_format;
use subscriber_etl::ingestion::{load_from_path, IngestionFormat, LoadOptions};
use subscriber_etl::IngestionError;

fn tmp_file(ext: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("subscriber-etl-unified-{nanos}.{ext}"))
}

#[test]
fn format_is_inferred_from_extension() {
    let opts = LoadOptions::default();
    assert_eq!(resolve_format(Path::new("a.CSV"), &opts).unwrap(), IngestionFormat::Csv);
    assert_eq!(resolve_format(Path::new("a.xlsx"), &opts).unwrap(), IngestionFormat::Excel);
    assert_eq!(resolve_format(Path::new("a.xls"), &opts).unwrap(), IngestionFormat::Excel);
    assert_eq!(resolve_format(Path::new("a.ndjson"), &opts).unwrap(), IngestionFormat::Json);
}

#[test]
fn unified_load_csv_auto_by_extension() {
    let ds = load_from_path("tests/fixtures/abonnes.csv", &LoadOptions::default()).unwrap();
    assert_eq!(ds.row_count(), 4);
    assert_eq!(ds.columns[0], "objectid");
}

#[test]
fn forced_format_overrides_extension() {
    let path = tmp_file("txt");
    std::fs::write(&path, "OBJECTID,Nom\n1,Zongo\n").unwrap();

    let opts = LoadOptions {
        format: Some(IngestionFormat::Csv),
        ..Default::default()
    };
    let ds = load_from_path(&path, &opts).unwrap();
    assert_eq!(ds.columns, vec!["objectid", "nom"]);

    let err = load_from_path(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, IngestionError::UnsupportedFormat { .. }));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn unsupported_and_missing_extensions_are_rejected() {
    let err = load_from_path("data.parquet", &LoadOptions::default()).unwrap_err();
    assert!(err.to_string().contains("unsupported format"));

    let err = load_from_path("data", &LoadOptions::default()).unwrap_err();
    assert!(err.to_string().contains("no extension"));
}
