#![cfg(feature = "excel")]

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{format_float, DataSet, Value};

use super::normalize_headers;

/// Load an Excel document (`.xlsx`, `.xls`, `.ods`, etc.) into an in-memory `DataSet`.
///
/// Behavior:
/// - Picks `sheet_name` if provided; otherwise uses the first sheet in the workbook
/// - Detects the first non-empty row as the header row
/// - Reads remaining rows and converts cells into [`Value`]s
pub fn load_excel_from_path(path: impl AsRef<Path>, sheet_name: Option<&str>) -> IngestionResult<DataSet> {
    match sheet_name {
        Some(name) => load_excel_workbook_from_path(path, Some(&[name][..])),
        None => {
            let mut workbook = open_workbook_auto(path)?;
            let first = workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(no_sheets)?;
            let range = workbook.worksheet_range(&first)?;
            let (columns, rows) = load_sheet_range(&first, &range)?;
            Ok(DataSet::new(columns, rows))
        }
    }
}

/// Load multiple sheets from an Excel workbook and concatenate all rows into one `DataSet`.
///
/// - If `sheet_names` is `None`, loads **all sheets** in workbook order.
/// - If `sheet_names` is `Some(&[...])`, loads only those sheets (in the provided order).
///
/// Every sheet must carry the same header as the first one.
pub fn load_excel_workbook_from_path(
    path: impl AsRef<Path>,
    sheet_names: Option<&[&str]>,
) -> IngestionResult<DataSet> {
    let mut workbook = open_workbook_auto(path)?;

    let sheets: Vec<String> = match sheet_names {
        Some(names) => names.iter().map(|s| s.to_string()).collect(),
        None => workbook.sheet_names().to_vec(),
    };
    if sheets.is_empty() {
        return Err(no_sheets());
    }

    let mut columns: Option<Vec<String>> = None;
    let mut all_rows: Vec<Vec<Value>> = Vec::new();
    for sheet in sheets {
        let range = workbook.worksheet_range(&sheet)?;
        let (sheet_columns, mut sheet_rows) = load_sheet_range(&sheet, &range)?;
        match &columns {
            None => columns = Some(sheet_columns),
            Some(expected) if *expected != sheet_columns => {
                return Err(IngestionError::SchemaMismatch {
                    message: format!(
                        "sheet '{sheet}': header {sheet_columns:?} differs from first sheet {expected:?}"
                    ),
                });
            }
            Some(_) => {}
        }
        all_rows.append(&mut sheet_rows);
    }

    Ok(DataSet::new(columns.unwrap_or_default(), all_rows))
}

/// Names of the sheets in a workbook, failing when it has none.
pub fn sheet_names(path: impl AsRef<Path>) -> IngestionResult<Vec<String>> {
    let workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_vec();
    if names.is_empty() {
        return Err(no_sheets());
    }
    Ok(names)
}

fn no_sheets() -> IngestionError {
    IngestionError::SchemaMismatch {
        message: "workbook has no sheets".to_string(),
    }
}

fn load_sheet_range(
    sheet: &str,
    range: &calamine::Range<Data>,
) -> IngestionResult<(Vec<String>, Vec<Vec<Value>>)> {
    let header_row_idx = range
        .rows()
        .position(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .ok_or_else(|| IngestionError::SchemaMismatch {
            message: format!("sheet '{sheet}': sheet has no non-empty rows (no header row found)"),
        })?;

    let header_cells: Vec<String> = range
        .rows()
        .nth(header_row_idx)
        .map(|row| row.iter().map(cell_to_string).collect())
        .unwrap_or_default();
    let columns = normalize_headers(header_cells).map_err(|e| wrap_schema_err_with_sheet(sheet, e))?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for row in range.rows().skip(header_row_idx + 1) {
        let out_row: Vec<Value> = (0..columns.len())
            .map(|idx| convert_cell(row.get(idx).unwrap_or(&Data::Empty)))
            .collect();
        if out_row.iter().all(Value::is_null) {
            continue;
        }
        rows.push(out_row);
    }

    Ok((columns, rows))
}

fn wrap_schema_err_with_sheet(sheet: &str, err: IngestionError) -> IngestionError {
    match err {
        IngestionError::SchemaMismatch { message } => IngestionError::SchemaMismatch {
            message: format!("sheet '{sheet}': {message}"),
        },
        other => other,
    }
}

fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(f) => f.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => "".to_string(),
    }
}

fn convert_cell(c: &Data) -> Value {
    match c {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::Int64(*i),
        Data::Float(f) => Value::Float64(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Utf8(s.trim().to_string()),
        other => Value::Utf8(cell_to_string(other)),
    }
}
