//! Workbook fixtures shared by the integration tests

#![allow(dead_code)]

use excelmgr::excel::{CalamineReader, WorkbookReader};
use excelmgr::SheetSet;
use rust_xlsxwriter::Workbook;
use std::path::Path;

/// One sheet: name, then rows with the header first. Cells that parse as numbers
/// are written as numbers.
pub type SheetSpec<'a> = (&'a str, Vec<Vec<&'a str>>);

pub fn workbook_bytes(sheets: &[SheetSpec]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                match value.parse::<f64>() {
                    Ok(n) => worksheet.write_number(r as u32, c as u16, n).unwrap(),
                    Err(_) => worksheet.write_string(r as u32, c as u16, *value).unwrap(),
                };
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

pub fn write_workbook(path: &Path, sheets: &[SheetSpec]) {
    std::fs::write(path, workbook_bytes(sheets)).unwrap();
}

/// `Region` + `Sales` sheet used by the split scenarios
pub fn write_regions(path: &Path) {
    write_workbook(
        path,
        &[(
            "Sales",
            vec![
                vec!["Region", "Sales"],
                vec!["A", "10"],
                vec!["B", "20"],
                vec!["A", "30"],
                vec!["C", "40"],
                vec!["B", "50"],
            ],
        )],
    );
}

pub fn read_back(path: &Path) -> SheetSet {
    CalamineReader::new().read_all(path).unwrap()
}

/// Sorted file names in a directory
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
