//! Input discovery: files, directories and glob patterns → concrete workbook paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::{ExcelMgrError, ExcelMgrResult};

/// Office writes `~$name.xlsx` lock files next to open workbooks
pub fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with("~$"))
        .unwrap_or(false)
}

fn has_glob_chars(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

fn build_globset(patterns: &[String]) -> ExcelMgrResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .build()
            .map_err(|e| ExcelMgrError::Validation(format!("Invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ExcelMgrError::Validation(format!("Invalid glob set: {e}")))
}

/// Files under `dir` whose name matches `globs`, sorted by path
fn expand_dir(dir: &Path, globs: &GlobSet, recursive: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(dir).min_depth(1).follow_links(false);
    let walker = if recursive { walker } else { walker.max_depth(1) };

    let mut found: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| !is_lock_file(p))
        .filter(|p| p.file_name().map(|n| globs.is_match(n)).unwrap_or(false))
        .collect();
    found.sort();
    found
}

/// Resolve inputs into an ordered, de-duplicated list of files.
///
/// - a file is taken as is (lock files excepted)
/// - a directory is expanded with `patterns`, descending when `recursive`
/// - a path whose last component is a glob (`data/*.xlsx`) is expanded in its parent
pub fn resolve(inputs: &[PathBuf], patterns: &[String], recursive: bool) -> ExcelMgrResult<Vec<PathBuf>> {
    let dir_globs = build_globset(patterns)?;
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for input in inputs {
        let expanded = if input.is_dir() {
            expand_dir(input, &dir_globs, recursive)
        } else if input.is_file() {
            if is_lock_file(input) {
                Vec::new()
            } else {
                vec![input.clone()]
            }
        } else {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if !has_glob_chars(&name) {
                return Err(ExcelMgrError::Validation(format!(
                    "Input not found: {}",
                    input.display()
                )));
            }
            let parent = input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let glob = Glob::new(&name)
                .map_err(|e| ExcelMgrError::Validation(format!("Invalid glob '{name}': {e}")))?;
            let mut single = GlobSetBuilder::new();
            single.add(glob);
            let single = single
                .build()
                .map_err(|e| ExcelMgrError::Validation(format!("Invalid glob '{name}': {e}")))?;
            expand_dir(parent, &single, recursive)
        };

        for path in expanded {
            if seen.insert(path.clone()) {
                resolved.push(path);
            }
        }
    }

    Ok(resolved)
}
