//! JSON loading implementation.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A single object: `{"a":1}`
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
//!
//! The same reader backs the replication path's file source, which needs the raw objects rather
//! than a [`DataSet`].

use std::fs;
use std::path::Path;

use serde_json::Map;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, Value};

use super::normalize_header;

/// A JSON object as read from the input.
pub type JsonObject = Map<String, serde_json::Value>;

/// Load a JSON file into an in-memory `DataSet`.
///
/// Columns are the union of the object keys (lowercased), in the order they are first seen.
/// Keys differing only by case are the same column.
pub fn load_json_from_path(path: impl AsRef<Path>) -> IngestionResult<DataSet> {
    let text = fs::read_to_string(path)?;
    load_json_from_str(&text)
}

/// Load JSON from an in-memory string into a [`DataSet`].
pub fn load_json_from_str(input: &str) -> IngestionResult<DataSet> {
    let objects = parse_json_objects(input)?;

    let mut columns: Vec<String> = Vec::new();
    let mut positions: Vec<Vec<(usize, &serde_json::Value)>> = Vec::with_capacity(objects.len());
    for obj in &objects {
        let mut row = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            let name = normalize_header(key, columns.len());
            let idx = match columns.iter().position(|c| *c == name) {
                Some(idx) => idx,
                None => {
                    columns.push(name);
                    columns.len() - 1
                }
            };
            if row.iter().any(|(seen, _)| *seen == idx) {
                return Err(IngestionError::SchemaMismatch {
                    message: format!("duplicate key '{}' after lowercasing", columns[idx]),
                });
            }
            row.push((idx, value));
        }
        positions.push(row);
    }
    if columns.is_empty() {
        return Err(IngestionError::SchemaMismatch {
            message: "json objects have no keys".to_string(),
        });
    }

    let rows = positions
        .into_iter()
        .map(|cells| {
            let mut row = vec![Value::Null; columns.len()];
            for (idx, value) in cells {
                row[idx] = convert_json_value(value);
            }
            row
        })
        .filter(|row| !row.iter().all(Value::is_null))
        .collect();

    Ok(DataSet::new(columns, rows))
}

/// Parse an array of objects, a single object, or NDJSON into a list of objects.
pub fn parse_json_objects(input: &str) -> IngestionResult<Vec<JsonObject>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IngestionError::SchemaMismatch {
            message: "json input is empty".to_string(),
        });
    }

    // First try parsing as a single JSON value (array or object).
    let values = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(v @ serde_json::Value::Object(_)) => vec![v],
        Ok(_) => {
            return Err(IngestionError::SchemaMismatch {
                message: "json must be an object, an array of objects, or NDJSON".to_string(),
            });
        }
        Err(_) => {
            // Fall back to NDJSON.
            let mut values = Vec::new();
            for (i, line) in trimmed.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let v = serde_json::from_str::<serde_json::Value>(line).map_err(|e| {
                    IngestionError::SchemaMismatch {
                        message: format!("invalid ndjson at line {}: {}", i + 1, e),
                    }
                })?;
                values.push(v);
            }
            values
        }
    };

    values
        .into_iter()
        .enumerate()
        .map(|(idx0, v)| match v {
            serde_json::Value::Object(obj) => Ok(obj),
            _ => Err(IngestionError::SchemaMismatch {
                message: format!("row {} is not a json object", idx0 + 1),
            }),
        })
        .collect()
}

fn convert_json_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) if s.trim().is_empty() => Value::Null,
        serde_json::Value::String(s) => Value::Utf8(s.clone()),
        nested => Value::Utf8(nested.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_is_accepted() {
        let objects = parse_json_objects("{\"a\":1}\n\n{\"a\":2}\n").unwrap();
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn keys_differing_by_case_share_a_column() {
        let ds = load_json_from_str(r#"[{"nom": "a"}, {"NOM": "b", "Lot": 1}]"#).unwrap();
        assert_eq!(ds.columns, vec!["nom", "lot"]);
        assert_eq!(ds.rows[1][0], Value::Utf8("b".to_string()));
        assert!(load_json_from_str(r#"{"nom": "a", "NOM": "b"}"#).is_err());
    }

    #[test]
    fn scalar_elements_are_rejected() {
        let err = parse_json_objects("[{\"a\":1}, 3]").unwrap_err();
        assert!(err.to_string().contains("row 2 is not a json object"));
    }
}
