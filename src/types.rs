//! Core data model types.
//!
//! A loaded file becomes a [`DataSet`]: an ordered list of lowercase column names and row-major
//! [`Value`] storage. Destination tables are described by a [`TableSchema`], a list of
//! [`ColumnDef`]s that only ever grows.

use serde::Serialize;

/// A single value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    /// Whether the value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form used when the value is written to a generic text column.
    ///
    /// Floats without a fractional part render as integers (`12.0` -> `"12"`), which is how
    /// spreadsheet identifiers stored as numbers should read back.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int64(i) => Some(i.to_string()),
            Value::Float64(f) => Some(format_float(*f)),
            Value::Bool(b) => Some(b.to_string()),
            Value::Utf8(s) => Some(s.clone()),
        }
    }

    /// Numeric view of the value, parsing text when needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            Value::Utf8(s) => s.trim().parse::<f64>().ok(),
            Value::Null | Value::Bool(_) => None,
        }
    }
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

/// In-memory tabular dataset loaded from one file.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Lowercase column names, in file order.
    pub columns: Vec<String>,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Iterate column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.index_of(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

/// Declared type of a destination column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    /// Generic wide text type every reconciled column receives.
    Text,
    /// Spatial point type with an SRID.
    Point { srid: i32 },
}

/// A destination column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub column_type: ColumnType,
    /// Whether the column is the table's primary key.
    pub primary_key: bool,
}

impl ColumnDef {
    /// A generic text column.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Text,
            primary_key: false,
        }
    }

    /// A point geometry column.
    pub fn point(name: impl Into<String>, srid: i32) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Point { srid },
            primary_key: false,
        }
    }

    /// Mark the column as primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Column set of an existing destination table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TableSchema {
    /// Columns in ordinal order.
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Create a schema from column definitions.
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    /// Whether a column with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Iterate column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// One row of a destination table, keyed by column name.
pub type StoredRow = serde_json::Map<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_floats_render_as_integers() {
        assert_eq!(Value::Float64(12.0).to_text().as_deref(), Some("12"));
        assert_eq!(Value::Float64(-1.25).to_text().as_deref(), Some("-1.25"));
        assert_eq!(Value::Null.to_text(), None);
    }

    #[test]
    fn text_values_parse_as_numbers() {
        assert_eq!(Value::Utf8(" 12.5 ".into()).as_f64(), Some(12.5));
        assert_eq!(Value::Utf8("abc".into()).as_f64(), None);
    }
}
