//! CLI command handlers

pub mod commands;

pub use commands::{combine, delete_cols, exit_code_for, preview, run_plan, split};
