//! What a plan execution produced.

use std::path::PathBuf;

use crate::error::ExcelMgrError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Written,
    SkippedDryRun,
    SkippedNoMatch,
    Failed { kind: &'static str, reason: String },
}

impl Outcome {
    pub fn failed(err: &ExcelMgrError) -> Self {
        Outcome::Failed {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Written => "written",
            Outcome::SkippedDryRun => "skipped-dry-run",
            Outcome::SkippedNoMatch => "skipped-no-match",
            Outcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub rows: usize,
    pub columns_removed: usize,
    pub sheets: usize,
}

impl std::ops::AddAssign for Counts {
    fn add_assign(&mut self, other: Self) {
        self.rows += other.rows;
        self.columns_removed += other.columns_removed;
        self.sheets += other.sheets;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetResult {
    pub sheet: String,
    pub outcome: Outcome,
    pub rows: usize,
    pub columns_removed: usize,
    /// Columns the sheet ends up with
    pub columns: Vec<String>,
}

/// Outcome of one output (or of one source that failed before producing any)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Source file this result is about, when there is exactly one
    pub source: Option<PathBuf>,
    /// Output path or database target
    pub output: Option<String>,
    pub outcome: Outcome,
    pub counts: Counts,
    pub sheets: Vec<SheetResult>,
    pub backup: Option<PathBuf>,
}

impl ExecutionResult {
    pub fn new(source: Option<PathBuf>, output: Option<String>, outcome: Outcome) -> Self {
        Self {
            source,
            output,
            outcome,
            counts: Counts::default(),
            sheets: Vec::new(),
            backup: None,
        }
    }

    pub fn failed(source: Option<PathBuf>, output: Option<String>, err: &ExcelMgrError) -> Self {
        Self::new(source, output, Outcome::failed(err))
    }

    pub fn with_counts(mut self, counts: Counts) -> Self {
        self.counts = counts;
        self
    }

    pub fn with_sheets(mut self, sheets: Vec<SheetResult>) -> Self {
        self.sheets = sheets;
        self
    }
}

/// Structure of one sheet as shown by `preview`
#[derive(Debug, Clone, PartialEq)]
pub struct SheetPreview {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub headers: Vec<String>,
    pub sample: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookPreview {
    pub path: PathBuf,
    pub encrypted: bool,
    pub sheets: Vec<SheetPreview>,
}

/// Everything one plan execution produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub operation: &'static str,
    pub dry_run: bool,
    pub results: Vec<ExecutionResult>,
    pub previews: Vec<WorkbookPreview>,
}

impl RunReport {
    pub fn new(run_id: String, operation: &'static str, dry_run: bool) -> Self {
        Self {
            run_id,
            operation,
            dry_run,
            results: Vec::new(),
            previews: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.outcome.is_failed())
    }

    /// 0 when everything succeeded, 2 when any known error was recorded
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            2
        } else {
            0
        }
    }

    pub fn totals(&self) -> Counts {
        let mut total = Counts::default();
        for result in &self.results {
            total += result.counts;
        }
        total
    }

    pub fn count(&self, label: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }
}
