use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::excel::OutputFormat;
use crate::executor::{record_known, Counts, ExecutionResult, Executor, RunReport, SheetResult};
use crate::naming::{sanitize_file_stem, sanitize_sheet_name, NameAllocator};
use crate::plan::{split_workbook_path, Destination, SplitPlan, SplitTarget};
use crate::safety::GateOptions;
use crate::types::{CellValue, GroupKey, SheetSet, Table};

/// Rows sharing one key value, in first-seen order
#[derive(Debug)]
pub(crate) struct Group {
    /// The key as it first appeared; `None` for empty keys
    pub label: Option<String>,
    pub rows: Vec<usize>,
}

/// Partition row indices by the value in column `by`. Every row lands in exactly one group.
pub(crate) fn group_rows(table: &Table, by: usize) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for (i, row) in table.rows.iter().enumerate() {
        let cell = row.get(by).unwrap_or(&CellValue::Empty);
        let key = cell.group_key();
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(Group {
                label: match key {
                    GroupKey::Empty => None,
                    _ => Some(cell.to_string()),
                },
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(i);
    }
    groups
}

pub(super) fn run(
    executor: &Executor,
    plan: &SplitPlan,
    inputs: &[PathBuf],
    report: &mut RunReport,
) -> ExcelMgrResult<()> {
    if let Destination::Database(db) = &plan.destination {
        let err = ExcelMgrError::UnsupportedDestination(format!(
            "split cannot write to a database ({})",
            db.uri.display()
        ));
        return record_known(report, inputs.first().map(PathBuf::as_path), Some(plan.destination.describe()), err);
    }

    for input in inputs {
        if let Err(err) = split_one(executor, plan, input, report) {
            record_known(report, Some(input), None, err)?;
        }
    }
    Ok(())
}

fn split_one(executor: &Executor, plan: &SplitPlan, input: &Path, report: &mut RunReport) -> ExcelMgrResult<()> {
    let table = {
        let handle = executor.open_source(input, plan.flags.credential.as_ref(), Some(&plan.output))?;
        let reader = executor.reader();
        let available = reader.sheet_names(handle.path())?;
        let sheet = match &plan.sheet {
            None => available.first(),
            Some(selector) => selector.pick(&available),
        }
        .cloned()
        .ok_or_else(|| ExcelMgrError::SheetNotFound {
            path: input.to_path_buf(),
            sheet: plan
                .sheet
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "<first sheet>".to_string()),
        })?;
        reader.read(handle.path(), &sheet)?
    };

    let by = plan
        .by_column
        .position(&table.columns)
        .ok_or_else(|| ExcelMgrError::ColumnNotFound {
            missing: vec![plan.by_column.to_string()],
            resolved: Vec::new(),
        })?;

    let groups = group_rows(&table, by);
    info!(
        file = %input.display(),
        rows = table.row_count(),
        groups = groups.len(),
        "rows grouped"
    );

    let options = GateOptions {
        dry_run: plan.flags.dry_run,
        overwrite_confirmed: plan.flags.overwrite_confirmed,
    };

    match plan.target {
        SplitTarget::Files => {
            let format = plan.file_format.output_format();
            let sheet_name = sanitize_sheet_name(&plan.output_sheet_name);
            let mut names = NameAllocator::for_files();

            for (ordinal, group) in groups.iter().enumerate() {
                let stem = names.allocate(&sanitize_file_stem(group.label.as_deref().unwrap_or("")));
                let path = plan.output.join(format!("{stem}.{}", format.extension()));
                let part = table.select_rows(&group.rows);
                let counts = Counts {
                    rows: part.row_count(),
                    columns_removed: 0,
                    sheets: 1,
                };
                let columns = part.columns.clone();
                let set: SheetSet = vec![(sheet_name.clone(), part)];

                let written = executor.gate_and_write(&path, false, options, || {
                    executor.writer().render(&set, format, plan.csv_add_bom)
                });
                match written {
                    Ok((outcome, _)) => {
                        // Output names come from cell values; only the ordinal is logged
                        info!(
                            file = %input.display(),
                            group = ordinal + 1,
                            rows = counts.rows,
                            outcome = outcome.label(),
                            "group output"
                        );
                        report.results.push(
                            ExecutionResult::new(
                                Some(input.to_path_buf()),
                                Some(path.display().to_string()),
                                outcome.clone(),
                            )
                            .with_counts(counts)
                            .with_sheets(vec![SheetResult {
                                sheet: sheet_name.clone(),
                                outcome,
                                rows: counts.rows,
                                columns_removed: 0,
                                columns,
                            }]),
                        );
                    }
                    Err(err) => record_known(
                        report,
                        Some(input),
                        Some(path.display().to_string()),
                        err,
                    )?,
                }
            }
        }
        SplitTarget::Sheets => {
            let path = split_workbook_path(input, &plan.output);
            let format = OutputFormat::from_path(&path)?;
            let mut names = NameAllocator::for_sheets();
            let mut set: SheetSet = Vec::with_capacity(groups.len());
            for group in &groups {
                let name = names.allocate(&sanitize_sheet_name(group.label.as_deref().unwrap_or("")));
                set.push((name, table.select_rows(&group.rows)));
            }

            let output = path.display().to_string();
            let (outcome, _) = executor.gate_and_write(&path, false, options, || {
                executor.writer().render(&set, format, plan.csv_add_bom)
            })?;
            info!(
                file = %output,
                sheets = set.len(),
                outcome = outcome.label(),
                "split workbook"
            );

            let sheets = set
                .iter()
                .map(|(name, part)| SheetResult {
                    sheet: name.clone(),
                    outcome: outcome.clone(),
                    rows: part.row_count(),
                    columns_removed: 0,
                    columns: part.columns.clone(),
                })
                .collect();
            report.results.push(
                ExecutionResult::new(Some(input.to_path_buf()), Some(output), outcome)
                    .with_counts(Counts {
                        rows: table.row_count(),
                        columns_removed: 0,
                        sheets: set.len(),
                    })
                    .with_sheets(sheets),
            );
        }
    }
    Ok(())
}
