//! Plan files: a YAML or JSON list of operations run in order.
//!
//! ```yaml
//! operations:
//!   - type: combine
//!     name: monthly
//!     inputs: [reports/]
//!     output: combined.xlsx
//!     add_source_column: true
//!   - type: delete
//!     path: combined.xlsx
//!     targets: [Notes]
//!     inplace: true
//! ```
//!
//! Options sit either inline or under an `options:` key. Relative paths resolve against the
//! plan file's directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_yaml::Value;
use tracing::debug;

use crate::config::Settings;
use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::plan::builder::{
    build_combine_plan, build_delete_plan, build_preview_plan, build_split_plan, CombineOptions,
    CredentialArgs, DeleteOptions, PreviewOptions, SplitOptions,
};
use crate::plan::Plan;

/// One entry of a plan file, already built
#[derive(Debug, Clone)]
pub struct PlanOperation {
    pub name: Option<String>,
    pub plan: Plan,
}

impl PlanOperation {
    pub fn label(&self, position: usize) -> String {
        match &self.name {
            Some(name) => format!("{name} ({})", self.plan.kind()),
            None => format!("#{position} ({})", self.plan.kind()),
        }
    }
}

/// Load and build every operation of a plan file. `force_dry_run` turns every
/// operation into a dry run regardless of what the file says.
pub fn load_plan_file(path: &Path, settings: &Settings, force_dry_run: bool) -> ExcelMgrResult<Vec<PlanOperation>> {
    if !path.is_file() {
        return Err(ExcelMgrError::Validation(format!(
            "Plan file not found: {}",
            path.display()
        )));
    }
    let text = fs::read_to_string(path)?;
    let text = text.trim_start_matches('\u{feff}');
    let base_dir = path
        .canonicalize()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let document: Value = if is_json {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ExcelMgrError::Validation(format!("Invalid plan JSON: {e}")))?;
        serde_yaml::to_value(json)
            .map_err(|e| ExcelMgrError::Validation(format!("Invalid plan JSON: {e}")))?
    } else {
        serde_yaml::from_str(text)
            .map_err(|e| ExcelMgrError::Validation(format!("Invalid plan YAML: {e}")))?
    };

    let entries = match document {
        Value::Null => Vec::new(),
        Value::Sequence(items) => items,
        Value::Mapping(mut map) => match map.remove("operations") {
            Some(Value::Sequence(items)) => items,
            Some(Value::Null) => Vec::new(),
            _ => {
                return Err(ExcelMgrError::Validation(
                    "Plan file must include an 'operations' list".to_string(),
                ))
            }
        },
        _ => {
            return Err(ExcelMgrError::Validation(
                "Plan file must be a list of operations or contain an 'operations' list"
                    .to_string(),
            ))
        }
    };

    let mut operations = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        let operation = build_operation(idx + 1, entry, &base_dir, settings, force_dry_run)?;
        operations.push(operation);
    }
    debug!(
        plan = %path.display(),
        operations = operations.len(),
        "plan file loaded"
    );
    Ok(operations)
}

fn build_operation(
    position: usize,
    entry: Value,
    base_dir: &Path,
    settings: &Settings,
    force_dry_run: bool,
) -> ExcelMgrResult<PlanOperation> {
    let Value::Mapping(mut map) = entry else {
        return Err(ExcelMgrError::Validation(format!(
            "Operation #{position} must be a mapping"
        )));
    };

    let kind = match map.remove("type") {
        Some(Value::String(kind)) => kind.to_ascii_lowercase(),
        _ => {
            return Err(ExcelMgrError::Validation(format!(
                "Operation #{position} needs a 'type' (combine, split, delete or preview)"
            )))
        }
    };
    let name = match map.remove("name") {
        Some(Value::String(name)) => Some(name),
        Some(other) => serde_yaml::to_string(&other).ok().map(|s| s.trim().to_string()),
        None => None,
    };
    let options = match map.remove("options") {
        Some(options @ Value::Mapping(_)) => options,
        Some(_) => {
            return Err(ExcelMgrError::Validation(format!(
                "Operation #{position} options must be a mapping"
            )))
        }
        None => Value::Mapping(map),
    };

    let plan = match kind.as_str() {
        "combine" => {
            let mut opts: CombineOptions = parse_options(position, options)?;
            opts.inputs = opts.inputs.iter().map(|p| rebase(base_dir, p)).collect();
            opts.output = rebase(base_dir, &opts.output);
            opts.db = opts.db.as_ref().map(|p| rebase(base_dir, p));
            rebase_credentials(base_dir, &mut opts.credentials);
            opts.run.dry_run |= force_dry_run;
            build_combine_plan(&opts, settings)?
        }
        "split" => {
            let mut opts: SplitOptions = parse_options(position, options)?;
            opts.input = rebase(base_dir, &opts.input);
            opts.output = rebase(base_dir, &opts.output);
            opts.db = opts.db.as_ref().map(|p| rebase(base_dir, p));
            rebase_credentials(base_dir, &mut opts.credentials);
            opts.run.dry_run |= force_dry_run;
            build_split_plan(&opts, settings)?
        }
        "delete" | "delete-cols" | "delete_cols" => {
            let mut opts: DeleteOptions = parse_options(position, options)?;
            opts.inputs = opts.inputs.iter().map(|p| rebase(base_dir, p)).collect();
            rebase_credentials(base_dir, &mut opts.credentials);
            opts.run.dry_run |= force_dry_run;
            build_delete_plan(&opts, settings)?
        }
        "preview" => {
            let mut opts: PreviewOptions = parse_options(position, options)?;
            opts.path = rebase(base_dir, &opts.path);
            rebase_credentials(base_dir, &mut opts.credentials);
            build_preview_plan(&opts, settings)?
        }
        other => {
            return Err(ExcelMgrError::Validation(format!(
                "Operation #{position} has unknown type '{other}' (expected combine, split, delete or preview)"
            )))
        }
    };

    Ok(PlanOperation { name, plan })
}

fn parse_options<T: DeserializeOwned>(position: usize, options: Value) -> ExcelMgrResult<T> {
    serde_yaml::from_value(options)
        .map_err(|e| ExcelMgrError::Validation(format!("Operation #{position}: {e}")))
}

fn rebase(base_dir: &Path, path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() || path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn rebase_credentials(base_dir: &Path, creds: &mut CredentialArgs) {
    creds.password_file = creds.password_file.as_ref().map(|p| rebase(base_dir, p));
    creds.password_map = creds.password_map.as_ref().map(|p| rebase(base_dir, p));
}
