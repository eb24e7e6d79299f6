use clap::{Args, Parser, Subcommand};
use excelmgr::cli;
use excelmgr::config::{LogFormat, MacroPolicy, Settings, DEFAULT_GLOB};
use excelmgr::error::ExcelMgrError;
use excelmgr::logging;
use excelmgr::plan::{CombineOptions, DeleteOptions, PreviewOptions, SplitOptions};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "excelmgr")]
#[command(about = "Combine, split and prune spreadsheet workbooks in bulk")]
#[command(long_about = "excelmgr - Batch workbook operations with safe writes

COMMANDS:
  combine      - Stack many workbooks into one sheet, or copy their sheets side by side
  split        - Partition one sheet into files or sheets by a column's values
  delete-cols  - Remove columns by name, pattern or position
  preview      - Show sheets, shapes and headers of a workbook
  run          - Execute a YAML/JSON plan file

SAFETY:
  --dry-run    runs everything but writes nothing
  -y/--yes     is required to overwrite an existing output
  --inplace    backs the original up to <stem>.bak.<ext> first

EXIT CODES:
  0  every file succeeded
  2  at least one file failed with a reported error
  1  unexpected failure

EXAMPLES:
  excelmgr combine reports/ -o all.xlsx --add-source-column
  excelmgr split sales.xlsx --by Region --out by_region
  excelmgr delete-cols data/ -t Notes,Internal --all-sheets --dry-run
  excelmgr run nightly.yaml")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Comma-separated patterns used when an input is a directory
    #[arg(long = "default-glob", global = true, env = "EXCELMGR_GLOB", default_value = DEFAULT_GLOB)]
    glob: String,

    /// Always descend into subdirectories of directory inputs
    #[arg(long = "default-recursive", global = true, env = "EXCELMGR_RECURSIVE")]
    recursive: bool,

    #[arg(long, global = true, value_enum, env = "EXCELMGR_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    #[arg(long, global = true, env = "EXCELMGR_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// What to do when an output is a macro-enabled workbook
    #[arg(long, global = true, value_enum, env = "EXCELMGR_MACRO_POLICY", default_value = "warn")]
    macro_policy: MacroPolicy,

    /// Where decrypted copies of encrypted sources are staged
    #[arg(long, global = true, env = "EXCELMGR_TEMP_DIR")]
    temp_dir: Option<PathBuf>,
}

impl GlobalArgs {
    fn settings(&self) -> Settings {
        Settings {
            glob: self.glob.clone(),
            recursive: self.recursive,
            log_format: self.log_format,
            log_level: self.log_level.clone(),
            macro_policy: self.macro_policy,
            temp_dir: self.temp_dir.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Combine many workbooks into one output
    Combine(CombineOptions),

    /// Split one sheet into files or sheets by a column's values
    Split(SplitOptions),

    #[command(long_about = "Delete columns from every matching workbook.

MATCH MODES:
  names   header names, case-sensitive (default)
  ci      header names, ignoring case
  index   1-based column positions

NAME STRATEGIES (names / ci):
  exact, contains, startswith, endswith, regex

Every target must resolve on a sheet or that sheet is left alone;
missing targets are all reported together.")]
    /// Delete columns by name, pattern or position
    DeleteCols(DeleteOptions),

    /// Show the structure of a workbook
    Preview(PreviewOptions),

    /// Run the operations of a YAML or JSON plan file in order
    Run {
        /// Plan file (.yaml, .yml or .json)
        plan: PathBuf,

        /// Force every operation into dry-run mode
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = cli.global.settings();
    logging::init(settings.log_format, &settings.log_level);

    match run(cli.command, &settings) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            let code = match err.downcast_ref::<ExcelMgrError>() {
                Some(known) => cli::exit_code_for(known),
                None => 1,
            };
            eprintln!("Error: {err:#}");
            ExitCode::from(code as u8)
        }
    }
}

fn run(command: Commands, settings: &Settings) -> anyhow::Result<u8> {
    let code = match command {
        Commands::Combine(opts) => cli::combine(&opts, settings)?,
        Commands::Split(opts) => cli::split(&opts, settings)?,
        Commands::DeleteCols(opts) => cli::delete_cols(&opts, settings)?,
        Commands::Preview(opts) => cli::preview(&opts, settings)?,
        Commands::Run { plan, dry_run } => cli::run_plan(&plan, dry_run, settings)?,
    };
    Ok(u8::try_from(code).unwrap_or(1))
}
