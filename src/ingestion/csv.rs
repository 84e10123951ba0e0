//! CSV loading implementation.

use std::path::Path;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, Value};

use super::normalize_headers;

/// Load a CSV file into an in-memory [`DataSet`].
///
/// Rules:
///
/// - CSV must have headers; header names are trimmed and lowercased.
/// - Values are kept as trimmed text; empty cells become [`Value::Null`].
/// - Rows shorter than the header are padded with nulls, longer rows are rejected.
/// - Rows where every cell is empty are skipped.
pub fn load_csv_from_path(path: impl AsRef<Path>) -> IngestionResult<DataSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    load_csv_from_reader(&mut rdr)
}

/// Load CSV data from an existing CSV reader.
pub fn load_csv_from_reader<R: std::io::Read>(rdr: &mut csv::Reader<R>) -> IngestionResult<DataSet> {
    let headers = rdr.headers()?.clone();
    let columns = normalize_headers(headers.iter().map(str::to_owned))?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (row_idx0, result) in rdr.records().enumerate() {
        // Report 1-based row number for users; +1 again because header is row 1.
        let user_row = row_idx0 + 2;
        let record = result?;

        if record.len() > columns.len() {
            return Err(IngestionError::ParseError {
                row: user_row,
                column: format!("#{}", columns.len() + 1),
                raw: record.iter().collect::<Vec<_>>().join(","),
                message: format!(
                    "expected {} fields, saw {}",
                    columns.len(),
                    record.len()
                ),
            });
        }

        let row: Vec<Value> = (0..columns.len())
            .map(|idx| text_value(record.get(idx).unwrap_or("")))
            .collect();
        if row.iter().all(Value::is_null) {
            continue;
        }
        rows.push(row);
    }

    Ok(DataSet::new(columns, rows))
}

fn text_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Value::Null
    } else {
        Value::Utf8(trimmed.to_owned())
    }
}
