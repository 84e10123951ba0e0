#![cfg(feature = "excel_test_writer")]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use subscriber_etl::ingestion::excel::{load_excel_from_path, load_excel_workbook_from_path, sheet_names};
use subscriber_etl::ingestion::{load_from_path, ExcelSheetSelection, LoadOptions};
use subscriber_etl::pipeline::{ingest_file, IngestOptions};
use subscriber_etl::store::MemoryConnector;
use subscriber_etl::types::Value;

fn tmp_file(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("subscriber-etl-{name}-{nanos}.xlsx"))
}

const HEADER: [&str; 6] = ["OBJECTID", "Nom", "POINT_X", "POINT_Y", "Latitude", "Longitude"];

fn write_header(ws: &mut rust_xlsxwriter::Worksheet, row: u32) {
    for (col, name) in HEADER.iter().enumerate() {
        ws.write_string(row, col as u16, *name).unwrap();
    }
}

fn write_subscriber(ws: &mut rust_xlsxwriter::Worksheet, row: u32, id: f64, name: &str, x: f64, y: f64) {
    ws.write_number(row, 0, id).unwrap();
    ws.write_string(row, 1, name).unwrap();
    ws.write_number(row, 2, x).unwrap();
    ws.write_number(row, 3, y).unwrap();
    ws.write_number(row, 4, y).unwrap();
    ws.write_number(row, 5, x).unwrap();
}

fn write_subscribers_xlsx(path: &PathBuf) {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Abonnes").unwrap();
    write_header(ws, 0);
    write_subscriber(ws, 1, 1.0, "Ouedraogo", -1.5196, 12.3714);
    write_subscriber(ws, 2, 2.0, "Kaboré", -1.5201, 12.3702);
    wb.save(path).unwrap();
}

fn write_two_sheet_xlsx(path: &PathBuf, second_header_matches: bool) {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();
    let ws1 = wb.add_worksheet();
    ws1.set_name("Janvier").unwrap();
    write_header(ws1, 0);
    write_subscriber(ws1, 1, 1.0, "Ouedraogo", -1.5196, 12.3714);

    let ws2 = wb.add_worksheet();
    ws2.set_name("Fevrier").unwrap();
    // Header preceded by a blank row.
    write_header(ws2, 1);
    if !second_header_matches {
        ws2.write_string(1, 6, "Extra").unwrap();
    }
    write_subscriber(ws2, 2, 3.0, "Sawadogo", -1.51, 12.36);
    wb.save(path).unwrap();
}

#[test]
fn load_excel_lowercases_headers_and_keeps_numbers() {
    let path = tmp_file("subscribers");
    write_subscribers_xlsx(&path);

    let ds = load_excel_from_path(&path, None).unwrap();
    assert_eq!(ds.columns, vec!["objectid", "nom", "point_x", "point_y", "latitude", "longitude"]);
    assert_eq!(ds.row_count(), 2);
    assert_eq!(ds.rows[0][0].to_text().as_deref(), Some("1"));
    assert_eq!(ds.rows[1][1], Value::Utf8("Kaboré".to_string()));
    assert_eq!(ds.rows[0][2].as_f64(), Some(-1.5196));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn all_sheets_are_concatenated_when_headers_match() {
    let path = tmp_file("two-sheets");
    write_two_sheet_xlsx(&path, true);

    assert_eq!(sheet_names(&path).unwrap(), vec!["Janvier", "Fevrier"]);
    let ds = load_excel_workbook_from_path(&path, None).unwrap();
    assert_eq!(ds.row_count(), 2);
    assert_eq!(ds.rows[1][1], Value::Utf8("Sawadogo".to_string()));

    let opts = LoadOptions {
        excel_sheet_selection: ExcelSheetSelection::Sheet("Fevrier".to_string()),
        ..Default::default()
    };
    let ds = load_from_path(&path, &opts).unwrap();
    assert_eq!(ds.row_count(), 1);
    assert_eq!(ds.rows[0][0].to_text().as_deref(), Some("3"));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn differing_sheet_headers_are_rejected() {
    let path = tmp_file("mismatch");
    write_two_sheet_xlsx(&path, false);

    let err = load_excel_workbook_from_path(&path, None).unwrap_err();
    assert!(err.to_string().contains("sheet 'Fevrier'"));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn excel_file_ingests_with_geometry() {
    let path = tmp_file("ingest");
    write_subscribers_xlsx(&path);
    let connector = MemoryConnector::new();
    let options = IngestOptions {
        table: "abonnes_excel".to_string(),
        ..Default::default()
    };

    let summary = ingest_file(&path, &connector, &options).unwrap();
    assert_eq!(summary.rows_inserted, 2);
    assert_eq!(summary.geometry.as_ref().map(|g| g.updated), Some(2));

    let rows = connector.rows("abonnes_excel");
    assert_eq!(rows[0]["objectid"], serde_json::json!("1"));
    assert_eq!(rows[0]["geom_wkt"], serde_json::json!("POINT(-1.5196 12.3714)"));

    let _ = std::fs::remove_file(&path);
}
