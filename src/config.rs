//! Runtime settings shared by the CLI and the execution engine.
//!
//! Every field can be set from an `EXCELMGR_*` environment variable; the CLI exposes the
//! same values as global flags with those variables as fallbacks.

use clap::ValueEnum;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Default source patterns used when a directory is given as an input
pub const DEFAULT_GLOB: &str = "*.xlsx,*.xlsm";

/// What to do when an output is a macro-enabled (`.xlsm`) workbook.
///
/// Only tabular data is re-emitted, so any VBA project in the source never reaches
/// the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacroPolicy {
    /// Log a warning and write anyway
    #[default]
    Warn,
    /// Fail the whole operation before anything is written
    Forbid,
    /// Write silently
    Ignore,
}

impl MacroPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MacroPolicy::Warn => "warn",
            MacroPolicy::Forbid => "forbid",
            MacroPolicy::Ignore => "ignore",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Comma-separated glob patterns for directory inputs
    pub glob: String,
    /// Descend into subdirectories when expanding directory inputs
    pub recursive: bool,
    pub log_format: LogFormat,
    pub log_level: String,
    pub macro_policy: MacroPolicy,
    /// Where decrypted copies of encrypted sources are staged.
    /// `None` stages them next to the operation's destination.
    pub temp_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            glob: DEFAULT_GLOB.to_string(),
            recursive: false,
            log_format: LogFormat::Json,
            log_level: "info".to_string(),
            macro_policy: MacroPolicy::Warn,
            temp_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from `EXCELMGR_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            glob: non_empty("EXCELMGR_GLOB").unwrap_or(defaults.glob),
            recursive: non_empty("EXCELMGR_RECURSIVE")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.recursive),
            log_format: non_empty("EXCELMGR_LOG_FORMAT")
                .and_then(|v| LogFormat::from_str(v.trim(), true).ok())
                .unwrap_or(defaults.log_format),
            log_level: non_empty("EXCELMGR_LOG_LEVEL").unwrap_or(defaults.log_level),
            macro_policy: non_empty("EXCELMGR_MACRO_POLICY")
                .and_then(|v| MacroPolicy::from_str(v.trim(), true).ok())
                .unwrap_or(defaults.macro_policy),
            temp_dir: non_empty("EXCELMGR_TEMP_DIR").map(PathBuf::from),
        }
    }

    /// The configured glob as individual patterns
    pub fn glob_patterns(&self) -> Vec<String> {
        split_patterns(&self.glob)
    }
}

/// Split a comma-separated pattern list, dropping blanks
pub fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
