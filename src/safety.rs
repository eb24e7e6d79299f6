//! Safety gate for destructive writes.
//!
//! Every output passes through a [`SafetyGate`] before a single byte reaches disk:
//!
//! ```text
//! pending ──review──▶ previewed            (dry run: nothing is ever written)
//!    │
//!    ├──review──▶ confirmed ──commit──▶ written
//!    │
//!    └──review──▶ aborted                  (destination exists, overwrite not confirmed)
//! ```
//!
//! In-place edits back the original up to `<stem>.bak.<ext>` before it is replaced.
//! Writes go to a temp file in the destination directory and are renamed into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ExcelMgrError, ExcelMgrResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Previewed,
    Confirmed,
    Written,
    Aborted,
}

/// Run-wide switches the gate consults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateOptions {
    pub dry_run: bool,
    pub overwrite_confirmed: bool,
}

#[derive(Debug)]
pub struct SafetyGate {
    destination: PathBuf,
    inplace: bool,
    state: GateState,
    backup: Option<PathBuf>,
}

impl SafetyGate {
    pub fn new(destination: impl Into<PathBuf>, inplace: bool) -> Self {
        Self {
            destination: destination.into(),
            inplace,
            state: GateState::Pending,
            backup: None,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Backup written (or, under dry run, that would be written) for an in-place edit
    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Decide whether the write may go ahead.
    pub fn review(&mut self, options: GateOptions) -> ExcelMgrResult<GateState> {
        if self.state != GateState::Pending {
            return Ok(self.state);
        }

        let exists = self.destination.exists();
        if exists && self.inplace {
            self.backup = Some(backup_path(&self.destination));
        }

        if options.dry_run {
            self.state = GateState::Previewed;
            return Ok(self.state);
        }

        if exists && !self.inplace && !options.overwrite_confirmed {
            self.state = GateState::Aborted;
            return Err(ExcelMgrError::ConfirmationRequired(self.destination.clone()));
        }

        self.state = GateState::Confirmed;
        Ok(self.state)
    }

    /// Place `bytes` at the destination. Only a confirmed gate writes.
    pub fn commit(&mut self, bytes: &[u8]) -> ExcelMgrResult<()> {
        match self.state {
            GateState::Confirmed => {}
            GateState::Previewed => return Ok(()),
            other => {
                return Err(ExcelMgrError::Write {
                    path: self.destination.clone(),
                    message: format!("write attempted from gate state {other:?}"),
                })
            }
        }

        let result = self.backup_then_write(bytes);
        self.state = if result.is_ok() {
            GateState::Written
        } else {
            GateState::Aborted
        };
        result
    }

    fn backup_then_write(&self, bytes: &[u8]) -> ExcelMgrResult<()> {
        if let Some(backup) = &self.backup {
            fs::copy(&self.destination, backup)?;
            info!(
                file = %self.destination.display(),
                backup = %backup.display(),
                "backup created"
            );
        }
        write_atomic(&self.destination, bytes)
    }
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` is `Some("")` for a bare file name
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Write to a temp file beside `dest`, sync, then rename over `dest`.
/// On any failure `dest` is left untouched and the temp file is removed.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> ExcelMgrResult<()> {
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    tmp.persist(dest).map_err(|e| ExcelMgrError::Write {
        path: dest.to_path_buf(),
        message: e.error.to_string(),
    })?;

    // Split output names derive from cell values, so only the directory is logged
    debug!(dir = %dir.display(), bytes = bytes.len(), "file written");
    Ok(())
}

/// `<stem>.bak.<ext>`, then `<stem>.bak.2.<ext>`, `<stem>.bak.3.<ext>`, ... until free
pub fn backup_path(original: &Path) -> PathBuf {
    let dir = parent_dir_or_dot(original);
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "backup".to_string());
    let ext = original
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let first = dir.join(format!("{stem}.bak{ext}"));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| dir.join(format!("{stem}.bak.{n}{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}
