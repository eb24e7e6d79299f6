//! Workbook reader: spreadsheet → `Table`

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::excel::{serial_to_datetime, WorkbookReader};
use crate::types::{CellValue, SheetSet, Table};

/// Reads `.xlsx`, `.xlsm`, `.xls` and `.ods` through calamine, and `.csv` / `.tsv`
/// through the csv crate (one sheet named after the file stem).
#[derive(Debug, Default, Clone, Copy)]
pub struct CalamineReader;

impl CalamineReader {
    pub fn new() -> Self {
        Self
    }

    fn delimiter(path: &Path) -> Option<u8> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => Some(b','),
            Some("tsv") => Some(b'\t'),
            _ => None,
        }
    }

    fn read_error(path: &Path, err: impl std::fmt::Display) -> ExcelMgrError {
        ExcelMgrError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    fn open(
        path: &Path,
    ) -> ExcelMgrResult<calamine::Sheets<std::io::BufReader<std::fs::File>>> {
        open_workbook_auto(path).map_err(|e| Self::read_error(path, e))
    }

    fn delimited_sheet_name(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Sheet1".to_string())
    }

    fn read_delimited(path: &Path, delimiter: u8) -> ExcelMgrResult<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Self::read_error(path, e))?;

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record
                .map_err(|e| Self::read_error(path, e))?
                .iter()
                .enumerate()
                .map(|(i, h)| {
                    if i == 0 {
                        h.trim_start_matches('\u{feff}').to_string()
                    } else {
                        h.to_string()
                    }
                })
                .collect(),
            None => return Ok(Table::default()),
        };

        let mut table = Table::from_raw_headers(headers);
        for record in records {
            let record = record.map_err(|e| Self::read_error(path, e))?;
            if record.len() > table.column_count() {
                warn!(
                    file = %path.display(),
                    header_columns = table.column_count(),
                    row_columns = record.len(),
                    "row wider than header; adding unnamed columns"
                );
            }
            table.push_row(
                record
                    .iter()
                    .map(|s| {
                        if s.is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::Text(s.to_string())
                        }
                    })
                    .collect(),
            );
        }
        Ok(table)
    }
}

impl WorkbookReader for CalamineReader {
    fn sheet_names(&self, path: &Path) -> ExcelMgrResult<Vec<String>> {
        if Self::delimiter(path).is_some() {
            return Ok(vec![Self::delimited_sheet_name(path)]);
        }
        Ok(Self::open(path)?.sheet_names())
    }

    fn read(&self, path: &Path, sheet: &str) -> ExcelMgrResult<Table> {
        if let Some(delimiter) = Self::delimiter(path) {
            if sheet != Self::delimited_sheet_name(path) {
                return Err(ExcelMgrError::SheetNotFound {
                    path: path.to_path_buf(),
                    sheet: sheet.to_string(),
                });
            }
            return Self::read_delimited(path, delimiter);
        }

        let mut workbook = Self::open(path)?;
        if !workbook.sheet_names().iter().any(|s| s == sheet) {
            return Err(ExcelMgrError::SheetNotFound {
                path: path.to_path_buf(),
                sheet: sheet.to_string(),
            });
        }
        let range = workbook
            .worksheet_range(sheet)
            .map_err(|e| Self::read_error(path, e))?;
        Ok(range_to_table(&range))
    }

    fn read_all(&self, path: &Path) -> ExcelMgrResult<SheetSet> {
        if let Some(delimiter) = Self::delimiter(path) {
            return Ok(vec![(
                Self::delimited_sheet_name(path),
                Self::read_delimited(path, delimiter)?,
            )]);
        }

        // One open for the whole workbook
        let mut workbook = Self::open(path)?;
        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| Self::read_error(path, e))?;
            sheets.push((name, range_to_table(&range)));
        }
        Ok(sheets)
    }
}

/// First row is the header; the rest are data rows
fn range_to_table(range: &Range<Data>) -> Table {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Table::default();
    };

    let headers = header_row
        .iter()
        .map(|cell| to_cell_value(cell).to_string())
        .collect();
    let mut table = Table::from_raw_headers(headers);

    for row in rows {
        table.push_row(row.iter().map(to_cell_value).collect());
    }
    table
}

fn to_cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            serial_to_datetime(serial)
                .map(CellValue::Date)
                .unwrap_or(CellValue::Number(serial))
        }
        Data::DateTimeIso(s) => parse_iso(s)
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
