//! Plans: immutable descriptions of one operation.
//!
//! A [`Plan`] is built once (from CLI arguments or a plan file, through the builders in
//! [`builder`]) and turned into a [`ValidatedPlan`] by [`Plan::validate`]. Validation expands
//! inputs into concrete files and rejects malformed targets, so the executor never sees an
//! unexpanded glob or an unparsed column reference.

pub mod builder;
pub mod file;
mod sources;

pub use builder::{
    build_combine_plan, build_delete_plan, build_preview_plan, build_split_plan, CombineOptions,
    CredentialArgs, DeleteOptions, PreviewOptions, RunArgs, SplitOptions,
};
pub use file::{load_plan_file, PlanOperation};
pub use sources::is_lock_file;

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;

use crate::credentials::Credential;
use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::excel::OutputFormat;
use crate::matcher::{self, MatchMode, NameStrategy};

//==============================================================================
// Building blocks
//==============================================================================

/// A sheet addressed by name or by 1-based position (`index:N`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    Name(String),
    Index(usize),
}

impl SheetSelector {
    pub fn parse(raw: &str) -> ExcelMgrResult<Self> {
        let cleaned = raw.trim();
        if cleaned.is_empty() {
            return Err(ExcelMgrError::Validation(
                "Sheet selector cannot be empty".to_string(),
            ));
        }
        match parse_index_prefix(cleaned, "sheet")? {
            Some(index) => Ok(SheetSelector::Index(index)),
            None => Ok(SheetSelector::Name(cleaned.to_string())),
        }
    }

    /// Pick the matching name from a workbook's sheet list
    pub fn pick<'a>(&self, sheet_names: &'a [String]) -> Option<&'a String> {
        match self {
            SheetSelector::Name(name) => sheet_names.iter().find(|s| *s == name),
            SheetSelector::Index(i) => i.checked_sub(1).and_then(|i| sheet_names.get(i)),
        }
    }
}

impl std::fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetSelector::Name(name) => write!(f, "{name}"),
            SheetSelector::Index(i) => write!(f, "index:{i}"),
        }
    }
}

/// A column addressed by header name or by 1-based position (`index:N`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Name(String),
    Index(usize),
}

impl ColumnRef {
    pub fn parse(raw: &str) -> ExcelMgrResult<Self> {
        let cleaned = raw.trim();
        if cleaned.is_empty() {
            return Err(ExcelMgrError::Validation(
                "Split column cannot be empty".to_string(),
            ));
        }
        match parse_index_prefix(cleaned, "column")? {
            Some(index) => Ok(ColumnRef::Index(index)),
            None => Ok(ColumnRef::Name(cleaned.to_string())),
        }
    }

    pub fn position(&self, columns: &[String]) -> Option<usize> {
        match self {
            ColumnRef::Name(name) => columns.iter().position(|c| c == name),
            ColumnRef::Index(i) => i.checked_sub(1).filter(|i| *i < columns.len()),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRef::Name(name) => write!(f, "{name}"),
            ColumnRef::Index(i) => write!(f, "index:{i}"),
        }
    }
}

/// `index:N` → `Some(N)`; anything without the prefix → `None`
fn parse_index_prefix(raw: &str, what: &str) -> ExcelMgrResult<Option<usize>> {
    let Some((prefix, rest)) = raw.split_once(':') else {
        return Ok(None);
    };
    if !prefix.trim().eq_ignore_ascii_case("index") {
        return Ok(None);
    }
    match rest.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => Err(ExcelMgrError::Validation(format!(
            "{what} index must be a whole number of 1 or more, got '{}'",
            rest.trim()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelection {
    #[default]
    All,
    Only(Vec<SheetSelector>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
pub enum CombineMode {
    /// Concatenate every sheet into one table
    #[default]
    #[serde(rename = "one-sheet", alias = "one_sheet")]
    OneSheet,
    /// Copy every source sheet into its own output sheet
    #[serde(rename = "multi-sheets", alias = "multi_sheets", alias = "multi-sheet")]
    MultiSheets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitTarget {
    /// One output file per group
    #[default]
    Files,
    /// One sheet per group in a single workbook
    Sheets,
}

/// Per-group file format in split-to-files mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Xlsx,
    Csv,
    Tsv,
}

impl FileFormat {
    pub fn output_format(&self) -> OutputFormat {
        match self {
            FileFormat::Xlsx => OutputFormat::Xlsx,
            FileFormat::Csv => OutputFormat::Csv,
            FileFormat::Tsv => OutputFormat::Tsv,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbWriteMode {
    /// Drop and recreate the table
    #[default]
    Replace,
    /// Insert into the existing table, creating it if needed
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDestination {
    /// SQLite database file
    pub uri: PathBuf,
    pub table: String,
    pub mode: DbWriteMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Path(PathBuf),
    Database(DatabaseDestination),
}

impl Destination {
    pub fn describe(&self) -> String {
        match self {
            Destination::Path(path) => path.display().to_string(),
            Destination::Database(db) => format!("sqlite:{}#{}", db.uri.display(), db.table),
        }
    }

    /// File the destination lives in
    pub fn location(&self) -> &Path {
        match self {
            Destination::Path(path) => path,
            Destination::Database(db) => &db.uri,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    /// One sheet; `None` means the first sheet
    Sheet(Option<SheetSelector>),
    AllSheets,
}

/// Where sources come from, before expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sources {
    pub inputs: Vec<PathBuf>,
    pub glob_patterns: Vec<String>,
    pub recursive: bool,
}

/// Switches every write-producing plan carries
#[derive(Debug, Clone, Default)]
pub struct RunFlags {
    pub dry_run: bool,
    pub overwrite_confirmed: bool,
    pub credential: Option<Credential>,
}

//==============================================================================
// Plans
//==============================================================================

#[derive(Debug, Clone)]
pub struct CombinePlan {
    pub sources: Sources,
    pub mode: CombineMode,
    pub include_sheets: SheetSelection,
    pub add_source_column: bool,
    pub output_sheet_name: String,
    pub destination: Destination,
    pub csv_add_bom: bool,
    pub flags: RunFlags,
}

#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub source: PathBuf,
    /// `None` reads the first sheet
    pub sheet: Option<SheetSelector>,
    pub by_column: ColumnRef,
    pub target: SplitTarget,
    /// Output directory (files) or workbook path / directory (sheets)
    pub output: PathBuf,
    pub file_format: FileFormat,
    pub output_sheet_name: String,
    pub destination: Destination,
    pub csv_add_bom: bool,
    pub flags: RunFlags,
}

#[derive(Debug, Clone)]
pub struct DeleteColumnsPlan {
    pub sources: Sources,
    pub targets: Vec<String>,
    pub match_mode: MatchMode,
    pub strategy: NameStrategy,
    pub scope: DeleteScope,
    pub inplace: bool,
    pub flags: RunFlags,
}

#[derive(Debug, Clone)]
pub struct PreviewPlan {
    pub source: PathBuf,
    /// Sample rows per sheet
    pub limit: Option<usize>,
    pub credential: Option<Credential>,
}

#[derive(Debug, Clone)]
pub enum Plan {
    Combine(CombinePlan),
    Split(SplitPlan),
    DeleteColumns(DeleteColumnsPlan),
    Preview(PreviewPlan),
}

impl Plan {
    pub fn kind(&self) -> &'static str {
        match self {
            Plan::Combine(_) => "combine",
            Plan::Split(_) => "split",
            Plan::DeleteColumns(_) => "delete",
            Plan::Preview(_) => "preview",
        }
    }

    /// Resolve inputs and check every plan-level invariant.
    pub fn validate(self) -> ExcelMgrResult<ValidatedPlan> {
        let inputs = match &self {
            Plan::Combine(plan) => {
                validate_combine(plan)?;
                resolve_nonempty(&plan.sources)?
            }
            Plan::Split(plan) => {
                validate_split(plan)?;
                vec![existing_file(&plan.source)?]
            }
            Plan::DeleteColumns(plan) => {
                validate_delete(plan)?;
                resolve_nonempty(&plan.sources)?
            }
            Plan::Preview(plan) => vec![existing_file(&plan.source)?],
        };

        Ok(ValidatedPlan { plan: self, inputs })
    }
}

/// A plan that passed [`Plan::validate`]; the only thing the executor runs.
#[derive(Debug, Clone)]
pub struct ValidatedPlan {
    plan: Plan,
    inputs: Vec<PathBuf>,
}

impl ValidatedPlan {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Concrete source files, in processing order
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn kind(&self) -> &'static str {
        self.plan.kind()
    }

    pub fn is_dry_run(&self) -> bool {
        match &self.plan {
            Plan::Combine(p) => p.flags.dry_run,
            Plan::Split(p) => p.flags.dry_run,
            Plan::DeleteColumns(p) => p.flags.dry_run,
            Plan::Preview(_) => true,
        }
    }

    /// Every file-system path this plan may write to, known before execution
    pub fn declared_outputs(&self) -> Vec<PathBuf> {
        match &self.plan {
            Plan::Combine(p) => match &p.destination {
                Destination::Path(path) => vec![path.clone()],
                Destination::Database(_) => Vec::new(),
            },
            Plan::Split(p) => match p.target {
                SplitTarget::Sheets => vec![split_workbook_path(&p.source, &p.output)],
                SplitTarget::Files => Vec::new(),
            },
            Plan::DeleteColumns(p) => self
                .inputs
                .iter()
                .map(|input| delete_output_path(input, p.inplace))
                .collect(),
            Plan::Preview(_) => Vec::new(),
        }
    }
}

fn resolve_nonempty(sources: &Sources) -> ExcelMgrResult<Vec<PathBuf>> {
    let files = sources::resolve(&sources.inputs, &sources.glob_patterns, sources.recursive)?;
    if files.is_empty() {
        return Err(ExcelMgrError::Validation(format!(
            "No input files matched {} (patterns: {})",
            sources
                .inputs
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            sources.glob_patterns.join(",")
        )));
    }
    Ok(files)
}

fn existing_file(path: &Path) -> ExcelMgrResult<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(ExcelMgrError::Validation(format!(
            "Input file not found: {}",
            path.display()
        )))
    }
}

fn validate_combine(plan: &CombinePlan) -> ExcelMgrResult<()> {
    if plan.output_sheet_name.trim().is_empty() {
        return Err(ExcelMgrError::Validation(
            "Output sheet name cannot be empty".to_string(),
        ));
    }
    match &plan.destination {
        Destination::Path(path) => {
            let format = OutputFormat::from_path(path)?;
            if format.is_delimited() && plan.mode == CombineMode::MultiSheets {
                return Err(ExcelMgrError::Validation(format!(
                    "Multi-sheet combine cannot write {}; use .xlsx or .xlsm",
                    path.display()
                )));
            }
        }
        Destination::Database(db) => {
            if plan.mode == CombineMode::MultiSheets {
                return Err(ExcelMgrError::UnsupportedDestination(
                    "database destinations require one-sheet combine".to_string(),
                ));
            }
            validate_table_name(&db.table)?;
        }
    }
    Ok(())
}

fn validate_split(plan: &SplitPlan) -> ExcelMgrResult<()> {
    if plan.output_sheet_name.trim().is_empty() {
        return Err(ExcelMgrError::Validation(
            "Output sheet name cannot be empty".to_string(),
        ));
    }
    if plan.target == SplitTarget::Sheets {
        OutputFormat::from_path(&split_workbook_path(&plan.source, &plan.output))?;
    }
    Ok(())
}

fn validate_delete(plan: &DeleteColumnsPlan) -> ExcelMgrResult<()> {
    if plan.targets.is_empty() {
        return Err(ExcelMgrError::Validation(
            "At least one column target is required".to_string(),
        ));
    }
    match plan.match_mode {
        MatchMode::Index => {
            matcher::parse_index_targets(&plan.targets)?;
        }
        mode if plan.strategy == NameStrategy::Regex => matcher::check_patterns(&plan.targets, mode)?,
        _ => {}
    }
    Ok(())
}

fn validate_table_name(table: &str) -> ExcelMgrResult<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(ExcelMgrError::Validation(format!(
            "Invalid table name '{table}': use letters, digits and underscores"
        )))
    }
}

/// `<stem>.cleaned.<ext>` beside the input, or the input itself for in-place edits
pub fn delete_output_path(input: &Path, inplace: bool) -> PathBuf {
    if inplace {
        return input.to_path_buf();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    input.with_file_name(format!("{stem}.cleaned{ext}"))
}

/// Split-to-sheets output: the given path when it names a workbook, otherwise
/// `<dir>/<input stem>_split.xlsx`
pub fn split_workbook_path(source: &Path, output: &Path) -> PathBuf {
    let names_workbook = output
        .extension()
        .and_then(|e| e.to_str())
        .and_then(OutputFormat::from_extension)
        .map(|f| !f.is_delimited())
        .unwrap_or(false);
    if names_workbook {
        return output.to_path_buf();
    }
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "workbook".to_string());
    output.join(format!("{stem}_split.xlsx"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sheet_selector_parse() {
        assert_eq!(SheetSelector::parse("index:2").unwrap(), SheetSelector::Index(2));
        assert_eq!(SheetSelector::parse(" INDEX: 3 ").unwrap(), SheetSelector::Index(3));
        assert_eq!(
            SheetSelector::parse("2023").unwrap(),
            SheetSelector::Name("2023".to_string())
        );
        assert!(SheetSelector::parse("index:0").is_err());
        assert!(SheetSelector::parse("index:x").is_err());
    }

    #[test]
    fn test_sheet_selector_pick() {
        let sheets = vec!["A".to_string(), "B".to_string()];
        assert_eq!(SheetSelector::Index(2).pick(&sheets), Some(&"B".to_string()));
        assert_eq!(SheetSelector::Index(3).pick(&sheets), None);
        assert_eq!(SheetSelector::Name("A".into()).pick(&sheets), Some(&"A".to_string()));
    }

    #[test]
    fn test_column_ref_position() {
        let columns = vec!["Region".to_string(), "Sales".to_string()];
        assert_eq!(ColumnRef::parse("Sales").unwrap().position(&columns), Some(1));
        assert_eq!(ColumnRef::parse("index:1").unwrap().position(&columns), Some(0));
        assert_eq!(ColumnRef::parse("index:5").unwrap().position(&columns), None);
    }

    #[test]
    fn test_delete_output_path() {
        assert_eq!(
            delete_output_path(Path::new("/d/book.xlsm"), false),
            PathBuf::from("/d/book.cleaned.xlsm")
        );
        assert_eq!(
            delete_output_path(Path::new("/d/book.xlsx"), true),
            PathBuf::from("/d/book.xlsx")
        );
    }

    #[test]
    fn test_split_workbook_path() {
        assert_eq!(
            split_workbook_path(Path::new("in/sales.xlsx"), Path::new("out/regions.xlsx")),
            PathBuf::from("out/regions.xlsx")
        );
        assert_eq!(
            split_workbook_path(Path::new("in/sales.xlsx"), Path::new("out")),
            PathBuf::from("out/sales_split.xlsx")
        );
    }

    #[test]
    fn test_index_delete_plan_rejects_zero() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.xlsx");
        fs::write(&input, b"").unwrap();

        let plan = Plan::DeleteColumns(DeleteColumnsPlan {
            sources: Sources {
                inputs: vec![input],
                glob_patterns: vec!["*.xlsx".into()],
                recursive: false,
            },
            targets: vec!["0".into(), "2".into()],
            match_mode: MatchMode::Index,
            strategy: NameStrategy::Exact,
            scope: DeleteScope::Sheet(None),
            inplace: false,
            flags: RunFlags::default(),
        });
        assert!(matches!(plan.validate(), Err(ExcelMgrError::Validation(_))));
    }

    #[test]
    fn test_validate_expands_directory_inputs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.xlsx"), b"").unwrap();
        fs::write(dir.path().join("a.xlsx"), b"").unwrap();

        let plan = Plan::DeleteColumns(DeleteColumnsPlan {
            sources: Sources {
                inputs: vec![dir.path().to_path_buf()],
                glob_patterns: vec!["*.xlsx".into()],
                recursive: false,
            },
            targets: vec!["Notes".into()],
            match_mode: MatchMode::Names,
            strategy: NameStrategy::Exact,
            scope: DeleteScope::AllSheets,
            inplace: false,
            flags: RunFlags::default(),
        });
        let validated = plan.validate().unwrap();
        assert_eq!(
            validated.inputs(),
            &[dir.path().join("a.xlsx"), dir.path().join("b.xlsx")]
        );
        assert_eq!(validated.declared_outputs()[0], dir.path().join("a.cleaned.xlsx"));
    }

    #[test]
    fn test_combine_database_requires_one_sheet_mode() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.xlsx"), b"").unwrap();

        let plan = Plan::Combine(CombinePlan {
            sources: Sources {
                inputs: vec![dir.path().to_path_buf()],
                glob_patterns: vec!["*.xlsx".into()],
                recursive: false,
            },
            mode: CombineMode::MultiSheets,
            include_sheets: SheetSelection::All,
            add_source_column: false,
            output_sheet_name: "Data".into(),
            destination: Destination::Database(DatabaseDestination {
                uri: dir.path().join("db.sqlite"),
                table: "combined".into(),
                mode: DbWriteMode::Replace,
            }),
            csv_add_bom: false,
            flags: RunFlags::default(),
        });
        assert!(matches!(
            plan.validate(),
            Err(ExcelMgrError::UnsupportedDestination(_))
        ));
    }
}
