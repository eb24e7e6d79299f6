//! Workbook writer: `Table`s → `.xlsx` / `.xlsm` / `.csv` / `.tsv` bytes

use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::excel::{datetime_to_serial, OutputFormat, WorkbookWriter, MAX_COLUMNS, MAX_ROWS};
use crate::types::{CellValue, SheetSet, Table};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Data-only writer. Styling, formulas and VBA projects are never emitted, so an `.xlsm`
/// output carries the same content as an `.xlsx` one.
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxWriter;

impl XlsxWriter {
    pub fn new() -> Self {
        Self
    }

    fn render_workbook(&self, sheets: &SheetSet) -> ExcelMgrResult<Vec<u8>> {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

        if sheets.is_empty() {
            workbook.add_worksheet();
        }

        for (name, table) in sheets {
            check_dimensions(name, table)?;
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(name).map_err(|e| {
                write_error(format!("Failed to name worksheet '{name}': {e}"))
            })?;
            write_table(worksheet, table, &date_format, &datetime_format)
                .map_err(|e| write_error(format!("Failed to write worksheet '{name}': {e}")))?;
        }

        workbook
            .save_to_buffer()
            .map_err(|e| write_error(format!("Failed to build workbook: {e}")))
    }

    fn render_delimited(
        &self,
        sheets: &SheetSet,
        format: OutputFormat,
        csv_add_bom: bool,
    ) -> ExcelMgrResult<Vec<u8>> {
        let [(_, table)] = sheets.as_slice() else {
            return Err(ExcelMgrError::Validation(format!(
                "{} output holds exactly one sheet, got {}",
                format.extension().to_uppercase(),
                sheets.len()
            )));
        };

        let mut buffer = Vec::new();
        if csv_add_bom {
            buffer.extend_from_slice(UTF8_BOM);
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(format.delimiter())
            .flexible(false)
            .from_writer(buffer);
        writer
            .write_record(&table.columns)
            .map_err(|e| write_error(e.to_string()))?;
        for row in &table.rows {
            writer
                .write_record(row.iter().map(|cell| cell.to_string()))
                .map_err(|e| write_error(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| write_error(e.to_string()))
    }
}

impl WorkbookWriter for XlsxWriter {
    fn render(&self, sheets: &SheetSet, format: OutputFormat, csv_add_bom: bool) -> ExcelMgrResult<Vec<u8>> {
        if format.is_delimited() {
            self.render_delimited(sheets, format, csv_add_bom)
        } else {
            self.render_workbook(sheets)
        }
    }
}

fn write_error(message: String) -> ExcelMgrError {
    ExcelMgrError::Write {
        path: "<buffer>".into(),
        message,
    }
}

fn check_dimensions(name: &str, table: &Table) -> ExcelMgrResult<()> {
    // +1 for the header row
    if table.row_count() + 1 > MAX_ROWS {
        return Err(ExcelMgrError::Validation(format!(
            "Sheet '{name}' has {} rows; Excel allows at most {}",
            table.row_count(),
            MAX_ROWS - 1
        )));
    }
    if table.column_count() > MAX_COLUMNS {
        return Err(ExcelMgrError::Validation(format!(
            "Sheet '{name}' has {} columns; Excel allows at most {MAX_COLUMNS}",
            table.column_count()
        )));
    }
    Ok(())
}

fn write_table(
    worksheet: &mut Worksheet,
    table: &Table,
    date_format: &Format,
    datetime_format: &Format,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    for (col, name) in table.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let excel_row = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            let excel_col = c as u16;
            match cell {
                CellValue::Text(s) => {
                    worksheet.write_string(excel_row, excel_col, s)?;
                }
                CellValue::Number(n) if n.is_finite() => {
                    worksheet.write_number(excel_row, excel_col, *n)?;
                }
                CellValue::Number(n) => {
                    worksheet.write_string(excel_row, excel_col, n.to_string())?;
                }
                CellValue::Boolean(b) => {
                    worksheet.write_boolean(excel_row, excel_col, *b)?;
                }
                CellValue::Date(d) => {
                    let format = if d.time() == chrono::NaiveTime::MIN {
                        date_format
                    } else {
                        datetime_format
                    };
                    match datetime_to_serial(d) {
                        Some(serial) if serial >= 0.0 => {
                            worksheet.write_number_with_format(excel_row, excel_col, serial, format)?;
                        }
                        _ => {
                            worksheet.write_string(excel_row, excel_col, cell.to_string())?;
                        }
                    }
                }
                CellValue::Empty => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::{CalamineReader, WorkbookReader};
    use tempfile::TempDir;

    fn sample() -> Table {
        let mut table = Table::new(vec!["Name".into(), "Score".into(), "Active".into()]);
        table.push_row(vec![
            CellValue::Text("Ada".into()),
            CellValue::Number(91.5),
            CellValue::Boolean(true),
        ]);
        table.push_row(vec![CellValue::Text("Grace".into()), CellValue::Empty]);
        table
    }

    #[test]
    fn test_csv_with_and_without_bom() {
        let writer = XlsxWriter::new();
        let sheets = vec![("Data".to_string(), sample())];

        let plain = writer.render(&sheets, OutputFormat::Csv, false).unwrap();
        assert!(plain.starts_with(b"Name,Score,Active\n"));

        let bom = writer.render(&sheets, OutputFormat::Csv, true).unwrap();
        assert!(bom.starts_with(UTF8_BOM));
        assert_eq!(&bom[UTF8_BOM.len()..], plain.as_slice());
    }

    #[test]
    fn test_tsv_uses_tabs() {
        let sheets = vec![("Data".to_string(), sample())];
        let bytes = XlsxWriter::new().render(&sheets, OutputFormat::Tsv, false).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Name\tScore\tActive\n"));
        assert!(text.contains("Ada\t91.5\tTRUE"));
    }

    #[test]
    fn test_csv_rejects_multiple_sheets() {
        let sheets = vec![("A".to_string(), sample()), ("B".to_string(), sample())];
        let err = XlsxWriter::new().render(&sheets, OutputFormat::Csv, false).unwrap_err();
        assert!(matches!(err, ExcelMgrError::Validation(_)));
    }

    #[test]
    fn test_xlsx_round_trip_through_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.xlsx");
        let sheets = vec![("Scores".to_string(), sample())];

        XlsxWriter::new()
            .write(&path, &sheets, OutputFormat::Xlsx, false)
            .unwrap();

        let table = CalamineReader::new().read(&path, "Scores").unwrap();
        assert_eq!(table.columns, vec!["Name", "Score", "Active"]);
        assert_eq!(table.rows[0][1], CellValue::Number(91.5));
        assert_eq!(table.rows[1][2], CellValue::Empty);
    }
}
