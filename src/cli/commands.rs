use crate::config::Settings;
use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::executor::{Counts, ExecutionResult, Executor, Outcome, RunReport, WorkbookPreview};
use crate::plan::{
    build_combine_plan, build_delete_plan, build_preview_plan, build_split_plan, load_plan_file,
    CombineOptions, DeleteOptions, Plan, PreviewOptions, SplitOptions,
};
use colored::Colorize;
use std::path::Path;

/// Exit code for a run where every file succeeded
pub const EXIT_OK: i32 = 0;
/// Exit code for a run that recorded at least one known error
pub const EXIT_KNOWN_FAILURE: i32 = 2;

/// Execute the combine command
pub fn combine(opts: &CombineOptions, settings: &Settings) -> ExcelMgrResult<i32> {
    println!("{}", "📚 excelmgr - Combining workbooks".bold().green());
    let report = execute(build_combine_plan(opts, settings)?, settings)?;
    print_report(&report);
    Ok(report.exit_code())
}

/// Execute the split command
pub fn split(opts: &SplitOptions, settings: &Settings) -> ExcelMgrResult<i32> {
    println!("{}", "✂️  excelmgr - Splitting workbook".bold().green());
    println!("   File: {}", opts.input.display());
    println!("   By:   {}\n", opts.by.bright_blue().bold());
    let report = execute(build_split_plan(opts, settings)?, settings)?;
    print_report(&report);
    Ok(report.exit_code())
}

/// Execute the delete-cols command
pub fn delete_cols(opts: &DeleteOptions, settings: &Settings) -> ExcelMgrResult<i32> {
    println!("{}", "🧹 excelmgr - Deleting columns".bold().green());
    println!("   Targets: {}\n", opts.targets.join(", ").bright_blue());
    let report = execute(build_delete_plan(opts, settings)?, settings)?;
    print_report(&report);
    Ok(report.exit_code())
}

/// Execute the preview command
pub fn preview(opts: &PreviewOptions, settings: &Settings) -> ExcelMgrResult<i32> {
    let report = execute(build_preview_plan(opts, settings)?, settings)?;
    for workbook in &report.previews {
        print_preview(workbook);
    }
    print_failures(&report);
    Ok(report.exit_code())
}

/// Execute every operation of a plan file in order.
///
/// A known error in one operation is reported and the next operation still runs.
pub fn run_plan(path: &Path, dry_run: bool, settings: &Settings) -> ExcelMgrResult<i32> {
    println!("{}", "🗂️  excelmgr - Running plan".bold().green());
    println!("   Plan: {}", path.display());
    if dry_run {
        println!("{}", "   📋 DRY RUN MODE - No changes will be written".yellow());
    }
    println!();

    let operations = load_plan_file(path, settings, dry_run)?;
    if operations.is_empty() {
        println!("{}", "⚠️  Plan has no operations".yellow());
        return Ok(EXIT_OK);
    }

    let mut exit_code = EXIT_OK;
    for (idx, operation) in operations.into_iter().enumerate() {
        let label = operation.label(idx + 1);
        println!("{} {}", "▶".cyan(), label.bold());

        let is_preview = matches!(operation.plan, Plan::Preview(_));
        match execute(operation.plan, settings) {
            Ok(report) => {
                if is_preview {
                    report.previews.iter().for_each(print_preview);
                    print_failures(&report);
                } else {
                    print_report(&report);
                }
                exit_code = exit_code.max(report.exit_code());
            }
            Err(err) if err.is_known() => {
                println!("   {} {}\n", "❌".red(), err.to_string().red());
                exit_code = EXIT_KNOWN_FAILURE;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(exit_code)
}

fn execute(plan: Plan, settings: &Settings) -> ExcelMgrResult<RunReport> {
    let validated = plan.validate()?;
    Executor::new(settings.clone()).execute(&validated)
}

//==============================================================================
// Summaries
//==============================================================================

fn print_report(report: &RunReport) {
    if report.dry_run {
        println!("{}", "📋 DRY RUN - no changes written".yellow());
    }
    for result in &report.results {
        print_result(result);
    }

    let totals = report.totals();
    println!();
    println!(
        "{} {} written, {} dry-run, {} no-match, {} failed ({})",
        "Σ".bold(),
        report.count("written").to_string().green(),
        report.count("skipped-dry-run").to_string().yellow(),
        report.count("skipped-no-match").to_string().yellow(),
        report.count("failed").to_string().red(),
        format_counts(&totals)
    );
    println!("   run id: {}\n", report.run_id.dimmed());
}

fn print_result(result: &ExecutionResult) {
    let target = describe_target(result);
    match &result.outcome {
        Outcome::Failed { kind, reason } => {
            println!("   {} {}", outcome_badge(&result.outcome), target);
            println!("      {} {}", format!("[{kind}]").red(), reason);
        }
        outcome => {
            println!(
                "   {} {} ({})",
                outcome_badge(outcome),
                target,
                format_counts(&result.counts)
            );
            if result.sheets.len() > 1 {
                for sheet in &result.sheets {
                    println!(
                        "      {} {} rows, {} columns removed",
                        sheet.sheet.cyan(),
                        sheet.rows,
                        sheet.columns_removed
                    );
                }
            }
            if let Some(backup) = &result.backup {
                println!("      backup: {}", backup.display());
            }
        }
    }
}

fn print_failures(report: &RunReport) {
    for result in report.results.iter().filter(|r| r.outcome.is_failed()) {
        print_result(result);
    }
}

/// Print a workbook's structure; the only place cell values are shown
fn print_preview(workbook: &WorkbookPreview) {
    let lock = if workbook.encrypted { " 🔒" } else { "" };
    println!("{}{}", workbook.path.display().to_string().bold(), lock);
    for sheet in &workbook.sheets {
        println!(
            "   📊 {} ({} rows × {} columns)",
            sheet.name.bright_blue().bold(),
            sheet.rows,
            sheet.columns
        );
        println!("      {}", sheet.headers.join(" | ").cyan());
        for row in &sheet.sample {
            println!("      {}", row.join(" | "));
        }
    }
    println!();
}

fn outcome_badge(outcome: &Outcome) -> colored::ColoredString {
    match outcome {
        Outcome::Written => "✅ written".green(),
        Outcome::SkippedDryRun => "📋 dry-run".yellow(),
        Outcome::SkippedNoMatch => "⏭️  no-match".yellow(),
        Outcome::Failed { .. } => "❌ failed".red(),
    }
}

/// `source → output`, with whichever side is known
fn describe_target(result: &ExecutionResult) -> String {
    match (&result.source, &result.output) {
        (Some(source), Some(output)) => format!("{} → {}", source.display(), output),
        (Some(source), None) => source.display().to_string(),
        (None, Some(output)) => output.clone(),
        (None, None) => "(plan)".to_string(),
    }
}

fn format_counts(counts: &Counts) -> String {
    let mut parts = vec![
        format!("{} {}", counts.rows, plural(counts.rows, "row", "rows")),
        format!("{} {}", counts.sheets, plural(counts.sheets, "sheet", "sheets")),
    ];
    if counts.columns_removed > 0 {
        parts.push(format!("{} columns removed", counts.columns_removed));
    }
    parts.join(", ")
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

/// Map an error that escaped a command to the process exit code
pub fn exit_code_for(err: &ExcelMgrError) -> i32 {
    if err.is_known() {
        EXIT_KNOWN_FAILURE
    } else {
        1
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
