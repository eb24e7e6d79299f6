//! One builder per operation.
//!
//! The option structs below are parsed by clap (subcommand arguments) *and* by serde
//! (plan-file entries), and both paths go through the same `build_*_plan` function, so a
//! plan file and the equivalent command line always produce the same [`Plan`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::config::{split_patterns, Settings};
use crate::credentials::{Credential, PasswordMap};
use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::matcher::{MatchMode, NameStrategy};
use crate::plan::{
    ColumnRef, CombineMode, CombinePlan, DatabaseDestination, DbWriteMode, DeleteColumnsPlan,
    DeleteScope, Destination, FileFormat, Plan, PreviewPlan, RunFlags, SheetSelection,
    SheetSelector, Sources, SplitPlan, SplitTarget,
};

//==============================================================================
// Shared argument groups
//==============================================================================

#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(default)]
pub struct RunArgs {
    /// Run every step but write nothing; report what would happen
    #[arg(long)]
    pub dry_run: bool,

    /// Overwrite existing outputs
    #[arg(short = 'y', long = "yes")]
    #[serde(alias = "yes", alias = "overwrite")]
    pub overwrite_confirmed: bool,
}

/// Where passwords for encrypted sources come from. At most one may be given.
#[derive(Clone, Default, Args, Deserialize)]
#[serde(default)]
pub struct CredentialArgs {
    /// Password for encrypted sources
    #[arg(long, env = "EXCELMGR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Read the password from this environment variable
    #[arg(long, value_name = "VAR")]
    pub password_env: Option<String>,

    /// Read the password from the first line of this file
    #[arg(long, value_name = "FILE")]
    pub password_file: Option<PathBuf>,

    /// Per-file passwords (.json, .csv with path,password headers, or .xlsx)
    #[arg(long, value_name = "FILE")]
    pub password_map: Option<PathBuf>,

    /// Inline per-file passwords (plan files only)
    #[arg(skip)]
    pub passwords: Option<BTreeMap<String, String>>,
}

impl std::fmt::Debug for CredentialArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialArgs")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env", &self.password_env)
            .field("password_file", &self.password_file)
            .field("password_map", &self.password_map)
            .field("passwords", &self.passwords.as_ref().map(|m| m.len()))
            .finish()
    }
}

impl CredentialArgs {
    pub fn to_credential(&self) -> ExcelMgrResult<Option<Credential>> {
        let given = [
            self.password.is_some(),
            self.password_env.is_some(),
            self.password_file.is_some(),
            self.password_map.is_some() || self.passwords.is_some(),
        ]
        .iter()
        .filter(|g| **g)
        .count();
        if given > 1 {
            return Err(ExcelMgrError::Validation(
                "Give only one of password, password_env, password_file or password_map"
                    .to_string(),
            ));
        }

        if let Some(password) = &self.password {
            return Ok(Some(Credential::Literal(Zeroizing::new(password.clone()))));
        }
        if let Some(var) = &self.password_env {
            return Ok(Some(Credential::Env(var.clone())));
        }
        if let Some(path) = &self.password_file {
            return Ok(Some(Credential::File(path.clone())));
        }
        if let Some(path) = &self.password_map {
            let map = PasswordMap::load(path, path.parent())?;
            return Ok(Some(Credential::Template(map)));
        }
        if let Some(inline) = &self.passwords {
            let mut map = PasswordMap::new();
            for (file, password) in inline {
                map.insert(file.clone(), password.clone());
            }
            return Ok(Some(Credential::Template(map)));
        }
        Ok(None)
    }

    fn flags(&self, run: &RunArgs) -> ExcelMgrResult<RunFlags> {
        Ok(RunFlags {
            dry_run: run.dry_run,
            overwrite_confirmed: run.overwrite_confirmed,
            credential: self.to_credential()?,
        })
    }
}

//==============================================================================
// Operation options
//==============================================================================

#[derive(Debug, Clone, Args, Deserialize)]
#[serde(default)]
pub struct CombineOptions {
    /// Files, directories or glob patterns to combine
    #[arg(required = true)]
    #[serde(alias = "input", deserialize_with = "de::paths")]
    pub inputs: Vec<PathBuf>,

    /// Output file (.xlsx, .xlsm, .csv or .tsv)
    #[arg(short, long, default_value = "combined.xlsx")]
    #[serde(alias = "output_path")]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value = "one-sheet")]
    pub mode: CombineMode,

    /// Comma-separated patterns for directory inputs [default: settings glob]
    #[arg(long)]
    pub glob: Option<String>,

    /// Descend into subdirectories of directory inputs
    #[arg(long)]
    pub recursive: bool,

    /// Sheets to take from each source, by name or index:N [default: all]
    #[arg(long = "sheets", value_delimiter = ',')]
    #[serde(alias = "sheets", deserialize_with = "de::sheet_list")]
    pub include_sheets: Vec<String>,

    /// Prepend a `source` column holding the originating file name
    #[arg(long)]
    pub add_source_column: bool,

    /// Sheet name of the combined table (one-sheet mode)
    #[arg(long, default_value = "Data")]
    #[serde(alias = "output_sheet_name")]
    pub sheet_name: String,

    /// Write to this SQLite database instead of a file (one-sheet mode)
    #[arg(long, value_name = "FILE", requires = "db_table")]
    pub db: Option<PathBuf>,

    #[arg(long, value_name = "TABLE")]
    pub db_table: Option<String>,

    #[arg(long, value_enum, default_value = "replace")]
    pub db_mode: DbWriteMode,

    /// Start CSV/TSV output with a UTF-8 byte order mark
    #[arg(long)]
    pub csv_add_bom: bool,

    #[command(flatten)]
    #[serde(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    #[serde(flatten)]
    pub credentials: CredentialArgs,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output: PathBuf::from("combined.xlsx"),
            mode: CombineMode::OneSheet,
            glob: None,
            recursive: false,
            include_sheets: Vec::new(),
            add_source_column: false,
            sheet_name: "Data".to_string(),
            db: None,
            db_table: None,
            db_mode: DbWriteMode::Replace,
            csv_add_bom: false,
            run: RunArgs::default(),
            credentials: CredentialArgs::default(),
        }
    }
}

#[derive(Debug, Clone, Args, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    /// Workbook to split
    #[serde(alias = "input_file")]
    pub input: PathBuf,

    /// Column whose values partition the rows (name or index:N)
    #[arg(long)]
    #[serde(alias = "by_column", deserialize_with = "de::scalar")]
    pub by: String,

    /// Sheet to read (name or index:N) [default: first sheet]
    #[arg(long)]
    #[serde(deserialize_with = "de::opt_sheet")]
    pub sheet: Option<String>,

    #[arg(long, value_enum, default_value = "files")]
    pub to: SplitTarget,

    /// Output directory, or the workbook path when splitting to sheets
    #[arg(short, long = "out", default_value = "out")]
    #[serde(alias = "out", alias = "output_dir")]
    pub output: PathBuf,

    /// File format of each group in files mode
    #[arg(long, value_enum, default_value = "xlsx")]
    #[serde(alias = "output_format")]
    pub format: FileFormat,

    /// Sheet name inside each per-group workbook
    #[arg(long, default_value = "Data")]
    #[serde(alias = "output_sheet_name")]
    pub sheet_name: String,

    /// Database destination (not supported for split)
    #[arg(long, value_name = "FILE", requires = "db_table")]
    pub db: Option<PathBuf>,

    #[arg(long, value_name = "TABLE")]
    pub db_table: Option<String>,

    /// Start CSV/TSV output with a UTF-8 byte order mark
    #[arg(long)]
    pub csv_add_bom: bool,

    #[command(flatten)]
    #[serde(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    #[serde(flatten)]
    pub credentials: CredentialArgs,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            by: String::new(),
            sheet: None,
            to: SplitTarget::Files,
            output: PathBuf::from("out"),
            format: FileFormat::Xlsx,
            sheet_name: "Data".to_string(),
            db: None,
            db_table: None,
            csv_add_bom: false,
            run: RunArgs::default(),
            credentials: CredentialArgs::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(default)]
pub struct DeleteOptions {
    /// Files, directories or glob patterns to clean
    #[arg(required = true)]
    #[serde(alias = "path", deserialize_with = "de::paths")]
    pub inputs: Vec<PathBuf>,

    /// Columns to delete, comma-separated (names, or positions with --match index)
    #[arg(short, long, value_delimiter = ',', required = true)]
    #[serde(deserialize_with = "de::string_list")]
    pub targets: Vec<String>,

    #[arg(long = "match", value_enum, default_value = "names")]
    #[serde(rename = "match", alias = "match_mode", alias = "match_kind")]
    pub match_mode: MatchMode,

    /// How name targets are compared to headers
    #[arg(long, value_enum, default_value = "exact")]
    pub strategy: NameStrategy,

    /// Sheet to clean (name or index:N) [default: first sheet]
    #[arg(long, conflicts_with = "all_sheets")]
    #[serde(deserialize_with = "de::opt_sheet")]
    pub sheet: Option<String>,

    /// Clean every sheet independently
    #[arg(long)]
    pub all_sheets: bool,

    /// Comma-separated patterns for directory inputs [default: settings glob]
    #[arg(long)]
    pub glob: Option<String>,

    #[arg(long)]
    pub recursive: bool,

    /// Replace the source (after backing it up) instead of writing <stem>.cleaned.<ext>
    #[arg(long)]
    pub inplace: bool,

    #[command(flatten)]
    #[serde(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    #[serde(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(default)]
pub struct PreviewOptions {
    /// Workbook to inspect
    #[serde(alias = "input")]
    pub path: PathBuf,

    /// Also print the first N rows of every sheet
    #[arg(long)]
    pub limit: Option<usize>,

    #[command(flatten)]
    #[serde(flatten)]
    pub credentials: CredentialArgs,
}

//==============================================================================
// Builders
//==============================================================================

fn sources(inputs: &[PathBuf], glob: Option<&str>, recursive: bool, settings: &Settings) -> Sources {
    Sources {
        inputs: inputs.to_vec(),
        glob_patterns: glob
            .map(split_patterns)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| settings.glob_patterns()),
        recursive: recursive || settings.recursive,
    }
}

fn database(
    db: &Option<PathBuf>,
    table: &Option<String>,
    mode: DbWriteMode,
) -> ExcelMgrResult<Option<DatabaseDestination>> {
    match (db, table) {
        (None, _) => Ok(None),
        (Some(uri), Some(table)) => Ok(Some(DatabaseDestination {
            uri: uri.clone(),
            table: table.trim().to_string(),
            mode,
        })),
        (Some(_), None) => Err(ExcelMgrError::Validation(
            "A database destination needs a table name (db_table)".to_string(),
        )),
    }
}

pub fn build_combine_plan(opts: &CombineOptions, settings: &Settings) -> ExcelMgrResult<Plan> {
    let include_sheets = match opts.include_sheets.as_slice() {
        [] => SheetSelection::All,
        [only] if only.trim().eq_ignore_ascii_case("all") => SheetSelection::All,
        many => SheetSelection::Only(
            many.iter()
                .map(|s| SheetSelector::parse(s))
                .collect::<ExcelMgrResult<Vec<_>>>()?,
        ),
    };

    let destination = match database(&opts.db, &opts.db_table, opts.db_mode)? {
        Some(db) => Destination::Database(db),
        None => Destination::Path(opts.output.clone()),
    };

    Ok(Plan::Combine(CombinePlan {
        sources: sources(&opts.inputs, opts.glob.as_deref(), opts.recursive, settings),
        mode: opts.mode,
        include_sheets,
        add_source_column: opts.add_source_column,
        output_sheet_name: opts.sheet_name.trim().to_string(),
        destination,
        csv_add_bom: opts.csv_add_bom,
        flags: opts.credentials.flags(&opts.run)?,
    }))
}

pub fn build_split_plan(opts: &SplitOptions, _settings: &Settings) -> ExcelMgrResult<Plan> {
    if opts.input.as_os_str().is_empty() {
        return Err(ExcelMgrError::Validation(
            "Split needs an input workbook".to_string(),
        ));
    }

    let destination = match database(&opts.db, &opts.db_table, DbWriteMode::Replace)? {
        Some(db) => Destination::Database(db),
        None => Destination::Path(opts.output.clone()),
    };

    Ok(Plan::Split(SplitPlan {
        source: opts.input.clone(),
        sheet: opts.sheet.as_deref().map(SheetSelector::parse).transpose()?,
        by_column: ColumnRef::parse(&opts.by)?,
        target: opts.to,
        output: opts.output.clone(),
        file_format: opts.format,
        output_sheet_name: opts.sheet_name.trim().to_string(),
        destination,
        csv_add_bom: opts.csv_add_bom,
        flags: opts.credentials.flags(&opts.run)?,
    }))
}

pub fn build_delete_plan(opts: &DeleteOptions, settings: &Settings) -> ExcelMgrResult<Plan> {
    let targets: Vec<String> = opts
        .targets
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let scope = match (&opts.sheet, opts.all_sheets) {
        (Some(_), true) => {
            return Err(ExcelMgrError::Validation(
                "Choose either a single sheet or all sheets, not both".to_string(),
            ))
        }
        (None, true) => DeleteScope::AllSheets,
        (sheet, false) => DeleteScope::Sheet(sheet.as_deref().map(SheetSelector::parse).transpose()?),
    };

    Ok(Plan::DeleteColumns(DeleteColumnsPlan {
        sources: sources(&opts.inputs, opts.glob.as_deref(), opts.recursive, settings),
        targets,
        match_mode: opts.match_mode,
        strategy: opts.strategy,
        scope,
        inplace: opts.inplace,
        flags: opts.credentials.flags(&opts.run)?,
    }))
}

pub fn build_preview_plan(opts: &PreviewOptions, _settings: &Settings) -> ExcelMgrResult<Plan> {
    Ok(Plan::Preview(PreviewPlan {
        source: opts.path.clone(),
        limit: opts.limit,
        credential: opts.credentials.to_credential()?,
    }))
}

//==============================================================================
// Lenient plan-file scalars: YAML happily turns `2023` or `1` into numbers
//==============================================================================

mod de {
    use serde::{Deserialize, Deserializer};
    use std::path::PathBuf;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    impl Scalar {
        fn into_text(self) -> String {
            match self {
                Scalar::Bool(b) => b.to_string(),
                Scalar::Int(n) => n.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Text(s) => s,
            }
        }

        /// Bare numbers address sheets by position
        fn into_sheet(self) -> String {
            match self {
                Scalar::Int(n) => format!("index:{n}"),
                other => other.into_text(),
            }
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Scalar>),
        One(Scalar),
    }

    impl OneOrMany {
        /// A single string may itself be a comma-separated list
        fn into_list(self, convert: fn(Scalar) -> String) -> Vec<String> {
            match self {
                OneOrMany::Many(items) => items.into_iter().map(convert).collect(),
                OneOrMany::One(Scalar::Text(s)) => s
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
                OneOrMany::One(other) => vec![convert(other)],
            }
        }
    }

    pub fn scalar<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Scalar::deserialize(d)?.into_text())
    }

    pub fn opt_sheet<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_sheet))
    }

    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(OneOrMany::deserialize(d)?.into_list(Scalar::into_text))
    }

    pub fn sheet_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(OneOrMany::deserialize(d)?.into_list(Scalar::into_sheet))
    }

    pub fn paths<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<PathBuf>, D::Error> {
        let list = match OneOrMany::deserialize(d)? {
            OneOrMany::Many(items) => items.into_iter().map(Scalar::into_text).collect(),
            OneOrMany::One(one) => vec![one.into_text()],
        };
        Ok(list.into_iter().map(PathBuf::from).collect())
    }
}
