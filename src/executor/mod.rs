//! Plan execution engine.
//!
//! For every source file: decrypt when needed → read → transform → safety gate → write.
//! Known errors (see [`ExcelMgrError::is_known`]) are recorded on the file they happened to
//! and the run continues; anything else aborts the run and is returned as `Err`.

mod combine;
mod database;
mod delete;
mod preview;
mod report;
mod split;

pub use report::{
    Counts, ExecutionResult, Outcome, RunReport, SheetPreview, SheetResult, WorkbookPreview,
};

use std::path::{Path, PathBuf};

use tracing::{debug, info, info_span, warn};

use crate::config::{MacroPolicy, Settings};
use crate::credentials::Credential;
use crate::crypto::{self, DecryptedWorkbook};
use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::excel::{CalamineReader, OutputFormat, WorkbookReader, WorkbookWriter, XlsxWriter};
use crate::logging;
use crate::plan::{Plan, ValidatedPlan};
use crate::safety::{GateOptions, GateState, SafetyGate};

/// A readable source: the file itself, or a decrypted copy that disappears on drop
pub(crate) enum SourceHandle {
    Plain(PathBuf),
    Decrypted(DecryptedWorkbook),
}

impl SourceHandle {
    pub fn path(&self) -> &Path {
        match self {
            SourceHandle::Plain(path) => path,
            SourceHandle::Decrypted(workbook) => workbook.path(),
        }
    }

    pub fn is_decrypted(&self) -> bool {
        matches!(self, SourceHandle::Decrypted(_))
    }
}

pub struct Executor {
    settings: Settings,
    reader: Box<dyn WorkbookReader>,
    writer: Box<dyn WorkbookWriter>,
}

impl Executor {
    /// Executor with the calamine reader and the xlsx/csv writer
    pub fn new(settings: Settings) -> Self {
        Self::with_io(settings, Box::new(CalamineReader::new()), Box::new(XlsxWriter::new()))
    }

    pub fn with_io(
        settings: Settings,
        reader: Box<dyn WorkbookReader>,
        writer: Box<dyn WorkbookWriter>,
    ) -> Self {
        Self {
            settings,
            reader,
            writer,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run a validated plan.
    pub fn execute(&self, plan: &ValidatedPlan) -> ExcelMgrResult<RunReport> {
        self.execute_with_run_id(plan, logging::run_id())
    }

    pub fn execute_with_run_id(&self, plan: &ValidatedPlan, run_id: String) -> ExcelMgrResult<RunReport> {
        let span = info_span!("run", run_id = %run_id, operation = plan.kind());
        let _enter = span.enter();

        let mut report = RunReport::new(run_id, plan.kind(), plan.is_dry_run());
        info!(
            inputs = plan.inputs().len(),
            dry_run = plan.is_dry_run(),
            "plan started"
        );

        // Plan-level checks: nothing has been read or written yet
        if let Err(err) = self.check_macro_policy(&plan.declared_outputs()) {
            warn!(error = err.kind(), "plan rejected");
            report.results.push(ExecutionResult::failed(None, None, &err));
            return Ok(report);
        }

        match plan.plan() {
            Plan::Combine(p) => combine::run(self, p, plan.inputs(), &mut report)?,
            Plan::Split(p) => split::run(self, p, plan.inputs(), &mut report)?,
            Plan::DeleteColumns(p) => delete::run(self, p, plan.inputs(), &mut report)?,
            Plan::Preview(p) => preview::run(self, p, plan.inputs(), &mut report)?,
        }

        info!(
            written = report.count("written"),
            dry_run = report.count("skipped-dry-run"),
            no_match = report.count("skipped-no-match"),
            failed = report.count("failed"),
            "plan finished"
        );
        Ok(report)
    }

    /// Apply the macro policy to every macro-enabled output
    pub fn check_macro_policy(&self, outputs: &[PathBuf]) -> ExcelMgrResult<()> {
        for output in outputs {
            let macro_enabled = OutputFormat::from_path(output)
                .map(|f| f.is_macro_enabled())
                .unwrap_or(false);
            if !macro_enabled {
                continue;
            }
            match self.settings.macro_policy {
                MacroPolicy::Forbid => {
                    warn!(
                        file = %output.display(),
                        policy = "forbid",
                        decision = "abort",
                        "macro-enabled output"
                    );
                    return Err(ExcelMgrError::MacroPolicyViolation(output.clone()));
                }
                MacroPolicy::Warn => warn!(
                    file = %output.display(),
                    policy = "warn",
                    decision = "proceed",
                    "macro-enabled output; VBA projects are not carried over"
                ),
                MacroPolicy::Ignore => debug!(
                    file = %output.display(),
                    policy = "ignore",
                    decision = "proceed",
                    "macro-enabled output"
                ),
            }
        }
        Ok(())
    }

    /// Make `path` readable, decrypting it into a scoped temp file when it is encrypted.
    ///
    /// The temp file goes to the configured temp dir, else beside `destination`.
    pub(crate) fn open_source(
        &self,
        path: &Path,
        credential: Option<&Credential>,
        destination: Option<&Path>,
    ) -> ExcelMgrResult<SourceHandle> {
        if !crypto::is_encrypted_file(path)? {
            return Ok(SourceHandle::Plain(path.to_path_buf()));
        }

        let credential = credential.ok_or_else(|| {
            ExcelMgrError::CredentialMissing(format!("{} (no password configured)", path.display()))
        })?;
        let password = credential.password_for(path)?;
        let staging = self.staging_dir(destination);
        let workbook = crypto::unlock(path, &password, staging.as_deref())?;
        // `password` is zeroized here, before any reading starts
        drop(password);

        info!(file = %path.display(), "encrypted source decrypted");
        Ok(SourceHandle::Decrypted(workbook))
    }

    /// Directory that holds decrypted copies. Falls back to the system temp dir when the
    /// destination's directory does not exist yet.
    fn staging_dir(&self, destination: Option<&Path>) -> Option<PathBuf> {
        if let Some(dir) = &self.settings.temp_dir {
            return Some(dir.clone());
        }
        destination
            .and_then(Path::parent)
            .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
            .filter(|p| p.is_dir())
            .map(Path::to_path_buf)
    }

    pub(crate) fn reader(&self) -> &dyn WorkbookReader {
        self.reader.as_ref()
    }

    pub(crate) fn writer(&self) -> &dyn WorkbookWriter {
        self.writer.as_ref()
    }

    /// Pass rendered output through a safety gate. Returns the outcome and the backup made.
    pub(crate) fn gate_and_write(
        &self,
        destination: &Path,
        inplace: bool,
        options: GateOptions,
        render: impl FnOnce() -> ExcelMgrResult<Vec<u8>>,
    ) -> ExcelMgrResult<(Outcome, Option<PathBuf>)> {
        let mut gate = SafetyGate::new(destination, inplace);
        let state = gate.review(options)?;
        // Rendering runs under dry run too, so format problems surface in the preview
        let bytes = render()?;
        gate.commit(&bytes)?;

        let backup = gate.backup().map(Path::to_path_buf);
        match state {
            GateState::Previewed => Ok((Outcome::SkippedDryRun, backup)),
            _ => Ok((Outcome::Written, backup)),
        }
    }
}

/// Record a per-file error when it is a known one; hand anything else back to abort the run.
pub(crate) fn record_known(
    report: &mut RunReport,
    source: Option<&Path>,
    output: Option<String>,
    err: ExcelMgrError,
) -> ExcelMgrResult<()> {
    if !err.is_known() {
        return Err(err);
    }
    warn!(
        file = source.map(|p| p.display().to_string()).unwrap_or_default(),
        error = err.kind(),
        reason = %err,
        "file failed"
    );
    report
        .results
        .push(ExecutionResult::failed(source.map(Path::to_path_buf), output, &err));
    Ok(())
}

/// Display name of a source file for the `source` column
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
