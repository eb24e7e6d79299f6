use std::path::PathBuf;

use tracing::info;

use crate::error::ExcelMgrResult;
use crate::executor::{record_known, Executor, RunReport, SheetPreview, WorkbookPreview};
use crate::plan::PreviewPlan;
use crate::types::Table;

pub(super) fn run(
    executor: &Executor,
    plan: &PreviewPlan,
    inputs: &[PathBuf],
    report: &mut RunReport,
) -> ExcelMgrResult<()> {
    for input in inputs {
        let preview = executor
            .open_source(input, plan.credential.as_ref(), None)
            .and_then(|handle| {
                let sheets = executor.reader().read_all(handle.path())?;
                Ok(WorkbookPreview {
                    path: input.clone(),
                    encrypted: handle.is_decrypted(),
                    sheets: sheets
                        .iter()
                        .map(|(name, table)| sheet_preview(name, table, plan.limit))
                        .collect(),
                })
            });

        match preview {
            Ok(preview) => {
                // Shapes only; sample cells go to stdout, never to the log
                info!(
                    file = %input.display(),
                    sheets = preview.sheets.len(),
                    encrypted = preview.encrypted,
                    "workbook previewed"
                );
                report.previews.push(preview);
            }
            Err(err) => record_known(report, Some(input), None, err)?,
        }
    }
    Ok(())
}

fn sheet_preview(name: &str, table: &Table, limit: Option<usize>) -> SheetPreview {
    let sample = table
        .rows
        .iter()
        .take(limit.unwrap_or(0))
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();
    SheetPreview {
        name: name.to_string(),
        rows: table.row_count(),
        columns: table.column_count(),
        headers: table.columns.clone(),
        sample,
    }
}
