//! Tabular file loading.
//!
//! Most callers should use [`load_from_path`] (from [`unified`]) which:
//!
//! - auto-detects format by file extension (or you can override via [`LoadOptions`])
//! - reads the header row and lowercases every column name
//! - loads all remaining rows into an in-memory [`crate::types::DataSet`]
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - [`json`]
//! - `excel` (Cargo feature `excel`)

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod json;
pub mod unified;

pub use unified::{load_from_path, ExcelSheetSelection, IngestionFormat, LoadOptions};

use crate::error::{IngestionError, IngestionResult};

/// Trim and lowercase header names.
///
/// Blank names become `unnamed_<index>`. Two headers that normalize to the same name are
/// rejected, since they would map onto one table column.
pub(crate) fn normalize_headers(
    raw: impl IntoIterator<Item = String>,
) -> IngestionResult<Vec<String>> {
    let mut columns: Vec<String> = Vec::new();
    for (idx, name) in raw.into_iter().enumerate() {
        let normalized = normalize_header(&name, idx);
        if columns.contains(&normalized) {
            return Err(IngestionError::SchemaMismatch {
                message: format!("duplicate column '{normalized}' after lowercasing headers"),
            });
        }
        columns.push(normalized);
    }
    if columns.is_empty() {
        return Err(IngestionError::SchemaMismatch {
            message: "header row has no columns".to_string(),
        });
    }
    Ok(columns)
}

/// Trimmed, lowercased column name; blank names become `unnamed_<index>`.
pub(crate) fn normalize_header(name: &str, idx: usize) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        format!("unnamed_{idx}")
    } else {
        trimmed.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_trimmed_and_lowercased() {
        let cols = normalize_headers(vec![" OBJECTID ".into(), "Numéro_Du_Compteur".into(), "".into()])
            .unwrap();
        assert_eq!(cols, vec!["objectid", "numéro_du_compteur", "unnamed_2"]);
    }

    #[test]
    fn case_only_duplicates_are_rejected() {
        let err = normalize_headers(vec!["Nom".into(), "NOM".into()]).unwrap_err();
        assert!(err.to_string().contains("duplicate column 'nom'"));
    }
}
