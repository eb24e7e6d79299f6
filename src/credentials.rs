//! Where workbook passwords come from.
//!
//! A [`Credential`] is resolved per source file right before decryption; the resulting
//! secret is wrapped in [`Zeroizing`] and dropped as soon as the decryptor is done with it.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Reader};
use zeroize::Zeroizing;

use crate::error::{ExcelMgrError, ExcelMgrResult};

pub type Secret = Zeroizing<String>;

#[derive(Clone)]
pub enum Credential {
    /// Password given directly
    Literal(Secret),
    /// Name of an environment variable holding the password
    Env(String),
    /// File whose first line is the password
    File(PathBuf),
    /// Per-file passwords
    Template(PasswordMap),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Literal(_) => write!(f, "Credential::Literal(<redacted>)"),
            Credential::Env(var) => write!(f, "Credential::Env({var})"),
            Credential::File(path) => write!(f, "Credential::File({})", path.display()),
            Credential::Template(map) => write!(f, "Credential::Template({} entries)", map.len()),
        }
    }
}

impl Credential {
    /// Password for one source file.
    pub fn password_for(&self, source: &Path) -> ExcelMgrResult<Secret> {
        match self {
            Credential::Literal(secret) => Ok(secret.clone()),
            Credential::Env(var) => std::env::var(var)
                .map(Zeroizing::new)
                .map_err(|_| {
                    ExcelMgrError::CredentialMissing(format!(
                        "{} (environment variable {var} is not set)",
                        source.display()
                    ))
                }),
            Credential::File(path) => {
                let raw = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
                    ExcelMgrError::CredentialMissing(format!(
                        "{} (password file {}: {e})",
                        source.display(),
                        path.display()
                    ))
                })?);
                let line = raw
                    .trim_start_matches('\u{feff}')
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim_end_matches('\r');
                Ok(Zeroizing::new(line.to_string()))
            }
            Credential::Template(map) => map.lookup(source).ok_or_else(|| {
                ExcelMgrError::CredentialMissing(format!(
                    "{} (no entry in password map)",
                    source.display()
                ))
            }),
        }
    }
}

/// File path → password table
#[derive(Clone, Default)]
pub struct PasswordMap {
    entries: HashMap<String, Secret>,
}

impl PasswordMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, password: impl Into<String>) {
        self.entries
            .insert(normalize_key(&path.into()), Zeroizing::new(password.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look a source up by its path as given, its canonical absolute path, then its file name.
    pub fn lookup(&self, source: &Path) -> Option<Secret> {
        let mut candidates = vec![source.to_string_lossy().to_string()];
        if let Ok(canonical) = source.canonicalize() {
            candidates.push(canonical.to_string_lossy().to_string());
        }
        if let Some(name) = source.file_name() {
            candidates.push(name.to_string_lossy().to_string());
        }

        candidates
            .iter()
            .find_map(|c| self.entries.get(&normalize_key(c)).cloned())
    }

    /// Load a map from `.json` (object of path → password), `.csv` (`path,password`
    /// headers) or a workbook whose first sheet has path and password columns.
    /// Relative keys are anchored at `base_dir` when given.
    pub fn load(path: &Path, base_dir: Option<&Path>) -> ExcelMgrResult<Self> {
        if !path.exists() {
            return Err(ExcelMgrError::Validation(format!(
                "Password map file not found: {}",
                path.display()
            )));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let pairs = match ext.as_str() {
            "json" => Self::read_json(path)?,
            "csv" => Self::read_csv(path)?,
            "xlsx" | "xlsm" | "xls" | "ods" => Self::read_workbook(path)?,
            _ => {
                return Err(ExcelMgrError::Validation(format!(
                    "Unsupported password map format: {} (use .json, .csv or .xlsx)",
                    path.display()
                )))
            }
        };

        let mut map = PasswordMap::new();
        for (key, password) in pairs {
            let key = key.trim().to_string();
            if key.is_empty() {
                continue;
            }
            map.insert(key.clone(), password.to_string());
            // Relative entries also resolve against the map's own directory
            if let Some(base) = base_dir {
                let candidate = Path::new(&key);
                if candidate.is_relative() && candidate.components().count() > 1 {
                    map.insert(base.join(candidate).to_string_lossy(), password.to_string());
                }
            }
        }
        Ok(map)
    }

    fn read_json(path: &Path) -> ExcelMgrResult<Vec<(String, Secret)>> {
        let text = Zeroizing::new(fs::read_to_string(path)?);
        let value: serde_json::Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
            .map_err(|e| ExcelMgrError::Validation(format!("Failed to parse password map JSON: {e}")))?;
        let object = value.as_object().ok_or_else(|| {
            ExcelMgrError::Validation(
                "Password map JSON must be an object mapping paths to passwords".to_string(),
            )
        })?;
        Ok(object
            .iter()
            .map(|(k, v)| {
                let password = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), Zeroizing::new(password))
            })
            .collect())
    }

    fn read_csv(path: &Path) -> ExcelMgrResult<Vec<(String, Secret)>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| ExcelMgrError::Validation(format!("Failed to read password CSV: {e}")))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ExcelMgrError::Validation(format!("Failed to read password CSV: {e}")))?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_ascii_lowercase())
            .collect();
        let path_idx = headers.iter().position(|h| h == "path");
        let password_idx = headers.iter().position(|h| h == "password");
        let (Some(path_idx), Some(password_idx)) = (path_idx, password_idx) else {
            return Err(ExcelMgrError::Validation(
                "Password CSV must include 'path' and 'password' columns".to_string(),
            ));
        };

        let mut pairs = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| ExcelMgrError::Validation(format!("Failed to read password CSV: {e}")))?;
            let key = record.get(path_idx).unwrap_or("").to_string();
            let password = Zeroizing::new(record.get(password_idx).unwrap_or("").to_string());
            pairs.push((key, password));
        }
        Ok(pairs)
    }

    /// Two-column sheet: path, password. A header row is skipped when its first cell
    /// reads `path`.
    fn read_workbook(path: &Path) -> ExcelMgrResult<Vec<(String, Secret)>> {
        let mut workbook = open_workbook_auto(path).map_err(|e| ExcelMgrError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let first = workbook.sheet_names().first().cloned().ok_or_else(|| {
            ExcelMgrError::Validation(format!("Password map {} has no sheets", path.display()))
        })?;
        let range = workbook
            .worksheet_range(&first)
            .map_err(|e| ExcelMgrError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut pairs = Vec::new();
        for (idx, row) in range.rows().enumerate() {
            let key = row.first().map(|c| c.to_string()).unwrap_or_default();
            if idx == 0 && key.trim().eq_ignore_ascii_case("path") {
                continue;
            }
            let password = Zeroizing::new(row.get(1).map(|c| c.to_string()).unwrap_or_default());
            pairs.push((key, password));
        }
        Ok(pairs)
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().replace('\\', "/")
}
