use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::excel::OutputFormat;
use crate::executor::{record_known, Counts, ExecutionResult, Executor, Outcome, RunReport, SheetResult};
use crate::matcher;
use crate::plan::{delete_output_path, DeleteColumnsPlan, DeleteScope};
use crate::safety::GateOptions;
use crate::types::SheetSet;

pub(super) fn run(
    executor: &Executor,
    plan: &DeleteColumnsPlan,
    inputs: &[PathBuf],
    report: &mut RunReport,
) -> ExcelMgrResult<()> {
    for input in inputs {
        let output = delete_output_path(input, plan.inplace);
        match delete_one(executor, plan, input, &output) {
            Ok(result) => {
                info!(
                    file = %input.display(),
                    outcome = result.outcome.label(),
                    sheets = result.counts.sheets,
                    columns_removed = result.counts.columns_removed,
                    rows = result.counts.rows,
                    "columns deleted"
                );
                report.results.push(result);
            }
            Err(err) => record_known(report, Some(input), Some(output.display().to_string()), err)?,
        }
    }
    Ok(())
}

fn delete_one(
    executor: &Executor,
    plan: &DeleteColumnsPlan,
    input: &Path,
    output: &Path,
) -> ExcelMgrResult<ExecutionResult> {
    let format = OutputFormat::from_path(output)?;
    let (mut set, decrypted) = {
        let handle = executor.open_source(input, plan.flags.credential.as_ref(), Some(output))?;
        (executor.reader().read_all(handle.path())?, handle.is_decrypted())
    };

    let in_scope = sheets_in_scope(plan, input, &set)?;
    let mut sheet_results = Vec::with_capacity(in_scope.len());
    let mut counts = Counts::default();

    for position in in_scope {
        let (name, table) = &mut set[position];
        let resolved = matcher::resolve(&plan.targets, plan.match_mode, plan.strategy, &table.columns);
        let positions = match (resolved, &plan.scope) {
            (Ok(positions), _) => positions,
            // Under all-sheets scope a sheet missing a target is left alone;
            // ambiguity still fails the file
            (Err(err @ ExcelMgrError::ColumnNotFound { .. }), DeleteScope::AllSheets) => {
                info!(
                    file = %input.display(),
                    sheet = %name,
                    error = err.kind(),
                    "sheet left unchanged"
                );
                sheet_results.push(SheetResult {
                    sheet: name.clone(),
                    outcome: Outcome::SkippedNoMatch,
                    rows: table.row_count(),
                    columns_removed: 0,
                    columns: table.columns.clone(),
                });
                continue;
            }
            (Err(err), _) => return Err(err),
        };

        table.remove_columns(&positions);
        info!(
            file = %input.display(),
            sheet = %name,
            removed = positions.len(),
            columns = table.column_count(),
            rows = table.row_count(),
            "sheet matched"
        );
        counts.rows += table.row_count();
        counts.columns_removed += positions.len();
        counts.sheets += 1;
        sheet_results.push(SheetResult {
            sheet: name.clone(),
            outcome: Outcome::Written,
            rows: table.row_count(),
            columns_removed: positions.len(),
            columns: table.columns.clone(),
        });
    }

    let output_label = Some(output.display().to_string());
    if counts.sheets == 0 {
        return Ok(ExecutionResult::new(Some(input.to_path_buf()), output_label, Outcome::SkippedNoMatch)
            .with_sheets(sheet_results));
    }

    if decrypted && !plan.flags.dry_run {
        warn!(
            file = %input.display(),
            output = %output.display(),
            "encrypted source is written without encryption"
        );
    }

    let options = GateOptions {
        dry_run: plan.flags.dry_run,
        overwrite_confirmed: plan.flags.overwrite_confirmed,
    };
    let (outcome, backup) = executor.gate_and_write(output, plan.inplace, options, || {
        executor.writer().render(&set, format, false)
    })?;
    if let Some(backup) = &backup {
        info!(file = %input.display(), backup = %backup.display(), "original backed up");
    }

    for sheet in sheet_results.iter_mut().filter(|s| s.outcome == Outcome::Written) {
        sheet.outcome = outcome.clone();
    }
    let mut result = ExecutionResult::new(Some(input.to_path_buf()), output_label, outcome)
        .with_counts(counts)
        .with_sheets(sheet_results);
    result.backup = backup;
    Ok(result)
}

/// Positions in `set` of the sheets the plan touches
fn sheets_in_scope(plan: &DeleteColumnsPlan, input: &Path, set: &SheetSet) -> ExcelMgrResult<Vec<usize>> {
    match &plan.scope {
        DeleteScope::AllSheets => Ok((0..set.len()).collect()),
        DeleteScope::Sheet(None) if !set.is_empty() => Ok(vec![0]),
        DeleteScope::Sheet(selector) => {
            let names: Vec<String> = set.iter().map(|(name, _)| name.clone()).collect();
            selector
                .as_ref()
                .and_then(|sel| sel.pick(&names))
                .and_then(|picked| names.iter().position(|n| n == picked))
                .map(|position| vec![position])
                .ok_or_else(|| ExcelMgrError::SheetNotFound {
                    path: input.to_path_buf(),
                    sheet: selector
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "<first sheet>".to_string()),
                })
        }
    }
}
