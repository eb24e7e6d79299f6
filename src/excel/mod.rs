//! Workbook I/O
//!
//! The engine only ever talks to spreadsheets through two primitives:
//! - [`WorkbookReader`]: list sheets, read one sheet into a [`Table`]
//! - [`WorkbookWriter`]: render a [`SheetSet`] into file bytes for a given [`OutputFormat`]
//!
//! The default implementations are backed by `calamine` (read) and `rust_xlsxwriter` / `csv`
//! (write).

mod reader;
mod writer;

pub use reader::CalamineReader;
pub use writer::XlsxWriter;

use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::safety;
use crate::types::{SheetSet, Table};

/// Excel's worksheet grid limits
pub const MAX_ROWS: usize = 1_048_576;
pub const MAX_COLUMNS: usize = 16_384;

/// File format of an output, inferred from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Xlsx,
    Xlsm,
    Csv,
    Tsv,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> ExcelMgrResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self::from_extension(&ext).ok_or_else(|| {
            ExcelMgrError::Validation(format!(
                "Unsupported output format for {} (expected .xlsx, .xlsm, .csv or .tsv)",
                path.display()
            ))
        })
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "xlsx" => Some(OutputFormat::Xlsx),
            "xlsm" => Some(OutputFormat::Xlsm),
            "csv" => Some(OutputFormat::Csv),
            "tsv" => Some(OutputFormat::Tsv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Xlsm => "xlsm",
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
        }
    }

    /// Outputs that fall under the macro policy
    pub fn is_macro_enabled(&self) -> bool {
        matches!(self, OutputFormat::Xlsm)
    }

    /// CSV and TSV hold exactly one sheet
    pub fn is_delimited(&self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Tsv)
    }

    pub fn delimiter(&self) -> u8 {
        match self {
            OutputFormat::Tsv => b'\t',
            _ => b',',
        }
    }
}

pub trait WorkbookReader {
    /// Sheet names in workbook order
    fn sheet_names(&self, path: &Path) -> ExcelMgrResult<Vec<String>>;

    /// Read one sheet; the first row is the header. Fails with `SheetNotFound`.
    fn read(&self, path: &Path, sheet: &str) -> ExcelMgrResult<Table>;

    /// Read every sheet, in workbook order
    fn read_all(&self, path: &Path) -> ExcelMgrResult<SheetSet> {
        let mut sheets = Vec::new();
        for name in self.sheet_names(path)? {
            let table = self.read(path, &name)?;
            sheets.push((name, table));
        }
        Ok(sheets)
    }
}

pub trait WorkbookWriter {
    /// Serialize sheets into the bytes of a complete file
    fn render(&self, sheets: &SheetSet, format: OutputFormat, csv_add_bom: bool) -> ExcelMgrResult<Vec<u8>>;

    /// Render and atomically place the result at `path`
    fn write(&self, path: &Path, sheets: &SheetSet, format: OutputFormat, csv_add_bom: bool) -> ExcelMgrResult<()> {
        let bytes = self.render(sheets, format, csv_add_bom)?;
        safety::write_atomic(path, &bytes)
    }
}

//==============================================================================
// Excel serial dates (1900 date system)
//==============================================================================

fn excel_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Convert an Excel serial number to a timestamp, to the millisecond
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    excel_epoch()?.checked_add_signed(Duration::milliseconds(millis))
}

pub fn datetime_to_serial(dt: &NaiveDateTime) -> Option<f64> {
    let delta = dt.signed_duration_since(excel_epoch()?);
    Some(delta.num_milliseconds() as f64 / 86_400_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(
            OutputFormat::from_path(&PathBuf::from("out/Report.XLSM")).unwrap(),
            OutputFormat::Xlsm
        );
        assert_eq!(
            OutputFormat::from_path(&PathBuf::from("a.tsv")).unwrap(),
            OutputFormat::Tsv
        );
        assert!(matches!(
            OutputFormat::from_path(&PathBuf::from("a.ods")),
            Err(ExcelMgrError::Validation(_))
        ));
    }

    #[test]
    fn test_only_xlsm_is_macro_enabled() {
        assert!(OutputFormat::Xlsm.is_macro_enabled());
        assert!(!OutputFormat::Xlsx.is_macro_enabled());
        assert!(!OutputFormat::Csv.is_macro_enabled());
    }

    #[test]
    fn test_serial_date_conversion() {
        let dt = serial_to_datetime(45292.5).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-01-01 12:00");
        assert_eq!(datetime_to_serial(&dt), Some(45292.5));
        assert!(serial_to_datetime(f64::NAN).is_none());
    }
}
