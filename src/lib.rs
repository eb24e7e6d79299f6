//! excelmgr - batch workbook operations with safe writes
//!
//! This library combines, splits and prunes spreadsheet workbooks. Every operation is
//! described by an immutable [`plan::Plan`], validated once, and run by the
//! [`executor::Executor`], which decrypts encrypted sources, reads them, transforms the
//! tables and writes the result through a safety gate (dry run, overwrite confirmation,
//! backups, atomic replace).
//!
//! # Example
//!
//! ```no_run
//! use excelmgr::config::Settings;
//! use excelmgr::executor::Executor;
//! use excelmgr::plan::{build_delete_plan, DeleteOptions};
//!
//! let settings = Settings::from_env();
//! let options = DeleteOptions {
//!     inputs: vec!["reports/".into()],
//!     targets: vec!["Notes".into()],
//!     all_sheets: true,
//!     ..Default::default()
//! };
//! let plan = build_delete_plan(&options, &settings)?.validate()?;
//! let report = Executor::new(settings).execute(&plan)?;
//!
//! println!("written: {}", report.count("written"));
//! # Ok::<(), excelmgr::error::ExcelMgrError>(())
//! ```

pub mod cli;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod excel;
pub mod executor;
pub mod logging;
pub mod matcher;
pub mod naming;
pub mod plan;
pub mod safety;
pub mod types;

// Re-export commonly used types
pub use error::{ExcelMgrError, ExcelMgrResult};
pub use types::{CellValue, SheetSet, Table};
