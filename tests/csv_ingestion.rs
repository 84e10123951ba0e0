use subscriber_etl::ingestion::csv::{load_csv_from_path, load_csv_from_reader};
use subscriber_etl::types::Value;
use subscriber_etl::IngestionError;

#[test]
fn load_csv_from_path_lowercases_headers() {
    let ds = load_csv_from_path("tests/fixtures/abonnes.csv").unwrap();

    assert_eq!(
        ds.columns,
        vec![
            "objectid",
            "section",
            "lot",
            "numéro_d_abonné",
            "point_x",
            "point_y",
            "latitude",
            "longitude",
            "nom"
        ]
    );
    assert_eq!(ds.row_count(), 4);
    assert_eq!(ds.value(1, "nom"), Some(&Value::Utf8("Kaboré".to_string())));
}

#[test]
fn empty_cells_become_null_and_values_are_trimmed() {
    let ds = load_csv_from_path("tests/fixtures/abonnes_sans_gps.csv").unwrap();

    assert_eq!(ds.columns, vec!["objectid", "section", "nom"]);
    assert_eq!(ds.row_count(), 3);
    assert_eq!(ds.value(2, "section"), Some(&Value::Utf8("D".to_string())));
    assert_eq!(ds.value(2, "nom"), Some(&Value::Utf8("Kientega".to_string())));

    let ds = load_csv_from_path("tests/fixtures/abonnes.csv").unwrap();
    assert_eq!(ds.value(2, "point_x"), Some(&Value::Null));
}

#[test]
fn short_rows_are_padded_and_blank_rows_skipped() {
    let input = "id,name,notes\n1,Ada\n,,\n2,Grace,x\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes());

    let ds = load_csv_from_reader(&mut rdr).unwrap();
    assert_eq!(ds.row_count(), 2);
    assert_eq!(ds.rows[0][2], Value::Null);
    assert_eq!(ds.rows[1][0], Value::Utf8("2".to_string()));
}

#[test]
fn long_rows_are_rejected_with_row_number() {
    let input = "id,name\n1,Ada\n2,Grace,extra\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes());

    let err = load_csv_from_reader(&mut rdr).unwrap_err();
    match err {
        IngestionError::ParseError { row, .. } => assert_eq!(row, 3),
        other => panic!("expected ParseError, got {other}"),
    }
}

#[test]
fn headers_colliding_after_lowercasing_are_rejected() {
    let input = "Nom,NOM\na,b\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let err = load_csv_from_reader(&mut rdr).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("schema mismatch"));
    assert!(msg.contains("duplicate column 'nom'"));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_csv_from_path("tests/fixtures/does_not_exist.csv").unwrap_err();
    match err {
        IngestionError::Csv(e) => assert!(matches!(e.kind(), csv::ErrorKind::Io(_))),
        IngestionError::Io(_) => {}
        other => panic!("expected an io failure, got {other}"),
    }
}
