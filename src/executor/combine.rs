use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::excel::OutputFormat;
use crate::executor::{
    database, file_name, record_known, Counts, ExecutionResult, Executor, Outcome, RunReport,
    SheetResult,
};
use crate::naming::{sanitize_sheet_name, NameAllocator};
use crate::plan::{CombineMode, CombinePlan, Destination, SheetSelection};
use crate::safety::GateOptions;
use crate::types::{unique_headers, CellValue, SheetSet, Table};

/// Name of the column added by `add_source_column`
pub const SOURCE_COLUMN: &str = "source";

/// One sheet read from one source
struct SourceSheet {
    file: String,
    sheet: String,
    table: Table,
}

pub(super) fn run(
    executor: &Executor,
    plan: &CombinePlan,
    inputs: &[PathBuf],
    report: &mut RunReport,
) -> ExcelMgrResult<()> {
    let mut collected = Vec::new();
    for input in inputs {
        match read_source(executor, plan, input) {
            Ok(mut sheets) => collected.append(&mut sheets),
            Err(err) => record_known(report, Some(input), None, err)?,
        }
    }

    let output = plan.destination.describe();
    if collected.is_empty() {
        warn!(output = %output, "no source sheets could be read; nothing to combine");
        report
            .results
            .push(ExecutionResult::new(None, Some(output), Outcome::SkippedNoMatch));
        return Ok(());
    }

    let result = match plan.mode {
        CombineMode::OneSheet => write_one_sheet(executor, plan, collected),
        CombineMode::MultiSheets => write_multi_sheets(executor, plan, collected),
    };
    match result {
        Ok(result) => {
            info!(
                output = %output,
                outcome = result.outcome.label(),
                rows = result.counts.rows,
                sheets = result.counts.sheets,
                "combine output"
            );
            report.results.push(result);
            Ok(())
        }
        Err(err) => record_known(report, None, Some(output), err),
    }
}

fn read_source(executor: &Executor, plan: &CombinePlan, input: &Path) -> ExcelMgrResult<Vec<SourceSheet>> {
    let handle = executor.open_source(
        input,
        plan.flags.credential.as_ref(),
        Some(plan.destination.location()),
    )?;
    let reader = executor.reader();
    let available = reader.sheet_names(handle.path())?;

    let selected: Vec<String> = match &plan.include_sheets {
        SheetSelection::All => available.clone(),
        SheetSelection::Only(selectors) => selectors
            .iter()
            .map(|sel| {
                sel.pick(&available)
                    .cloned()
                    .ok_or_else(|| ExcelMgrError::SheetNotFound {
                        path: input.to_path_buf(),
                        sheet: sel.to_string(),
                    })
            })
            .collect::<ExcelMgrResult<_>>()?,
    };

    let file = file_name(input);
    let mut sheets = Vec::with_capacity(selected.len());
    for sheet in selected {
        let table = reader.read(handle.path(), &sheet)?;
        info!(
            file = %input.display(),
            sheet = %sheet,
            rows = table.row_count(),
            columns = table.column_count(),
            "sheet read"
        );
        sheets.push(SourceSheet {
            file: file.clone(),
            sheet,
            table,
        });
    }
    Ok(sheets)
}

/// Concatenate tables, aligning columns by name in first-seen order.
fn concat(sheets: Vec<SourceSheet>, add_source_column: bool) -> Table {
    let mut sheets = sheets;
    if add_source_column {
        // A source header that is already called `source` becomes `source.1`
        for sheet in &mut sheets {
            let mut headers = vec![SOURCE_COLUMN.to_string()];
            headers.append(&mut sheet.table.columns);
            sheet.table.columns = unique_headers(headers).split_off(1);
        }
    }

    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    if add_source_column {
        index.insert(SOURCE_COLUMN.to_string(), 0);
        columns.push(SOURCE_COLUMN.to_string());
    }
    for sheet in &sheets {
        for column in &sheet.table.columns {
            if !index.contains_key(column) {
                index.insert(column.clone(), columns.len());
                columns.push(column.clone());
            }
        }
    }

    let mut merged = Table::new(columns);
    for sheet in sheets {
        let positions: Vec<usize> = sheet
            .table
            .columns
            .iter()
            .filter_map(|c| index.get(c).copied())
            .collect();
        for row in sheet.table.rows {
            let mut out = vec![CellValue::Empty; merged.column_count()];
            if add_source_column {
                out[0] = CellValue::Text(sheet.file.clone());
            }
            for (value, &pos) in row.into_iter().zip(&positions) {
                out[pos] = value;
            }
            merged.push_row(out);
        }
    }
    merged
}

fn write_one_sheet(executor: &Executor, plan: &CombinePlan, sheets: Vec<SourceSheet>) -> ExcelMgrResult<ExecutionResult> {
    let sheet_count = sheets.len();
    let merged = concat(sheets, plan.add_source_column);
    let counts = Counts {
        rows: merged.row_count(),
        columns_removed: 0,
        sheets: sheet_count,
    };
    let sheet_name = sanitize_sheet_name(&plan.output_sheet_name);
    let sheet_result = SheetResult {
        sheet: sheet_name.clone(),
        outcome: Outcome::Written,
        rows: merged.row_count(),
        columns_removed: 0,
        columns: merged.columns.clone(),
    };

    match &plan.destination {
        Destination::Database(db) => {
            let outcome = if plan.flags.dry_run {
                Outcome::SkippedDryRun
            } else {
                database::write_table(db, &merged, plan.flags.overwrite_confirmed)?;
                Outcome::Written
            };
            let sheet_result = SheetResult {
                outcome: outcome.clone(),
                ..sheet_result
            };
            Ok(ExecutionResult::new(None, Some(plan.destination.describe()), outcome)
                .with_counts(counts)
                .with_sheets(vec![sheet_result]))
        }
        Destination::Path(path) => {
            let format = OutputFormat::from_path(path)?;
            let set: SheetSet = vec![(sheet_name, merged)];
            let (outcome, _) = executor.gate_and_write(path, false, gate_options(plan), || {
                executor.writer().render(&set, format, plan.csv_add_bom)
            })?;
            let sheet_result = SheetResult {
                outcome: outcome.clone(),
                ..sheet_result
            };
            Ok(ExecutionResult::new(None, Some(path.display().to_string()), outcome)
                .with_counts(counts)
                .with_sheets(vec![sheet_result]))
        }
    }
}

fn write_multi_sheets(executor: &Executor, plan: &CombinePlan, sheets: Vec<SourceSheet>) -> ExcelMgrResult<ExecutionResult> {
    let Destination::Path(path) = &plan.destination else {
        return Err(ExcelMgrError::UnsupportedDestination(
            "database destinations require one-sheet combine".to_string(),
        ));
    };
    let format = OutputFormat::from_path(path)?;

    let mut names = NameAllocator::for_sheets();
    let mut set: SheetSet = Vec::with_capacity(sheets.len());
    let mut counts = Counts::default();
    for mut source in sheets {
        if plan.add_source_column {
            source
                .table
                .prepend_column(SOURCE_COLUMN.to_string(), CellValue::Text(source.file.clone()));
        }
        let name = names.allocate(&sanitize_sheet_name(&source.sheet));
        counts.rows += source.table.row_count();
        counts.sheets += 1;
        set.push((name, source.table));
    }

    let (outcome, _) = executor.gate_and_write(path, false, gate_options(plan), || {
        executor.writer().render(&set, format, plan.csv_add_bom)
    })?;

    let sheet_results = set
        .iter()
        .map(|(name, table)| SheetResult {
            sheet: name.clone(),
            outcome: outcome.clone(),
            rows: table.row_count(),
            columns_removed: 0,
            columns: table.columns.clone(),
        })
        .collect();
    Ok(ExecutionResult::new(None, Some(path.display().to_string()), outcome)
        .with_counts(counts)
        .with_sheets(sheet_results))
}

fn gate_options(plan: &CombinePlan) -> GateOptions {
    GateOptions {
        dry_run: plan.flags.dry_run,
        overwrite_confirmed: plan.flags.overwrite_confirmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sheet(file: &str, columns: &[&str], rows: usize) -> SourceSheet {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for r in 0..rows {
            table.push_row(
                columns
                    .iter()
                    .map(|c| CellValue::Text(format!("{c}{r}")))
                    .collect(),
            );
        }
        SourceSheet {
            file: file.to_string(),
            sheet: "Sheet1".to_string(),
            table,
        }
    }

    #[test]
    fn test_concat_aligns_columns_by_name() {
        let merged = concat(
            vec![
                sheet("a.xlsx", &["Name", "City"], 3),
                sheet("b.xlsx", &["Name", "Age"], 3),
            ],
            true,
        );

        assert_eq!(merged.columns, vec!["source", "Name", "City", "Age"]);
        assert_eq!(merged.row_count(), 6);
        assert_eq!(merged.rows[0][0], CellValue::Text("a.xlsx".into()));
        assert_eq!(merged.rows[0][3], CellValue::Empty);
        assert_eq!(merged.rows[3][0], CellValue::Text("b.xlsx".into()));
        assert_eq!(merged.rows[3][2], CellValue::Empty);
        assert_eq!(merged.rows[3][3], CellValue::Text("Age0".into()));
    }

    #[test]
    fn test_existing_source_header_is_kept_apart() {
        let merged = concat(vec![sheet("a.xlsx", &["source", "X"], 1)], true);
        assert_eq!(merged.columns, vec!["source", "source.1", "X"]);
        assert_eq!(merged.rows[0][0], CellValue::Text("a.xlsx".into()));
        assert_eq!(merged.rows[0][1], CellValue::Text("source0".into()));
    }

    #[test]
    fn test_concat_without_source_column() {
        let merged = concat(vec![sheet("a.xlsx", &["X"], 2)], false);
        assert_eq!(merged.columns, vec!["X"]);
        assert_eq!(merged.row_count(), 2);
    }
}
