//! Unified loading entrypoint.
//!
//! [`load_from_path`] picks a loader from [`LoadOptions::format`], or from the file extension
//! when no format is forced, and returns a [`DataSet`] with lowercase column names.

use std::path::Path;

use crate::error::{IngestionError, IngestionResult};
use crate::types::DataSet;

use super::{csv, json};

/// Input formats accepted for file ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionFormat {
    /// Delimited text with a header row.
    Csv,
    /// Array of objects, single object, or one object per line.
    Json,
    /// Spreadsheet workbook (needs the `excel` feature to load).
    Excel,
}

impl IngestionFormat {
    /// Format for a file extension, ignoring case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let format = match ext.to_ascii_lowercase().as_str() {
            "csv" => Self::Csv,
            "json" | "ndjson" => Self::Json,
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Self::Excel,
            _ => return None,
        };
        Some(format)
    }

    fn from_path(path: &Path) -> IngestionResult<Self> {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Err(IngestionError::UnsupportedFormat {
                message: format!("{} has no extension to infer a format from", path.display()),
            });
        };
        Self::from_extension(ext).ok_or_else(|| IngestionError::UnsupportedFormat {
            message: format!("extension '.{ext}' of {} is not csv, json or a workbook", path.display()),
        })
    }
}

/// Which sheets of a workbook are read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExcelSheetSelection {
    /// The first sheet.
    #[default]
    First,
    /// One sheet, by name.
    Sheet(String),
    /// Every sheet, rows concatenated in workbook order.
    AllSheets,
    /// The listed sheets, rows concatenated in list order.
    Sheets(Vec<String>),
}

impl ExcelSheetSelection {
    #[cfg(feature = "excel")]
    fn load(&self, path: &Path) -> IngestionResult<DataSet> {
        use super::excel::{load_excel_from_path, load_excel_workbook_from_path};

        match self {
            Self::First => load_excel_from_path(path, None),
            Self::Sheet(name) => load_excel_from_path(path, Some(name.as_str())),
            Self::AllSheets => load_excel_workbook_from_path(path, None),
            Self::Sheets(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                load_excel_workbook_from_path(path, Some(names.as_slice()))
            }
        }
    }

    #[cfg(not(feature = "excel"))]
    fn load(&self, _path: &Path) -> IngestionResult<DataSet> {
        Err(IngestionError::UnsupportedFormat {
            message: "workbook support is disabled (cargo feature 'excel')".to_string(),
        })
    }
}

/// Options controlling how a file is loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Forced format; `None` infers it from the extension.
    pub format: Option<IngestionFormat>,
    /// Sheets to read when the file is a workbook.
    pub excel_sheet_selection: ExcelSheetSelection,
}

/// Load a file into a [`DataSet`].
///
/// ```no_run
/// use subscriber_etl::ingestion::{load_from_path, LoadOptions};
///
/// # fn main() -> Result<(), subscriber_etl::IngestionError> {
/// let ds = load_from_path("abonnes.xlsx", &LoadOptions::default())?;
/// println!("columns={:?} rows={}", ds.columns, ds.row_count());
/// # Ok(())
/// # }
/// ```
pub fn load_from_path(path: impl AsRef<Path>, options: &LoadOptions) -> IngestionResult<DataSet> {
    let path = path.as_ref();
    match resolve_format(path, options)? {
        IngestionFormat::Csv => csv::load_csv_from_path(path),
        IngestionFormat::Json => json::load_json_from_path(path),
        IngestionFormat::Excel => options.excel_sheet_selection.load(path),
    }
}

/// Format that [`load_from_path`] would use for `path` under `options`.
pub fn resolve_format(path: &Path, options: &LoadOptions) -> IngestionResult<IngestionFormat> {
    options.format.map_or_else(|| IngestionFormat::from_path(path), Ok)
}
