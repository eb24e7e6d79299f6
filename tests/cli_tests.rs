//! CLI Integration Tests
//!
//! Runs the `excelmgr` binary with assert_cmd to exercise main.rs, exit codes and the
//! stdout/stderr split.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

mod common;

use assert_cmd::Command;
use common::{listing, read_back, write_regions, write_workbook};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn excelmgr() -> Command {
    let mut cmd = Command::cargo_bin("excelmgr").unwrap();
    cmd.env_remove("EXCELMGR_MACRO_POLICY")
        .env_remove("EXCELMGR_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_help() {
    excelmgr()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("excelmgr"))
        .stdout(predicate::str::contains("COMMANDS"))
        .stdout(predicate::str::contains("delete-cols"));
}

#[test]
fn test_cli_version() {
    excelmgr()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("excelmgr"));
}

#[test]
fn test_delete_cols_help_lists_match_modes() {
    excelmgr()
        .args(["delete-cols", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("startswith"));
}

// ═══════════════════════════════════════════════════════════════════════════
// DELETE-COLS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_delete_cols_success() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("data.csv");
    fs::write(&input, "Keep,Notes\n1,x\n").unwrap();

    excelmgr()
        .args(["delete-cols", input.to_str().unwrap(), "-t", "notes", "--match", "ci"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("written"));

    assert_eq!(
        fs::read_to_string(dir.path().join("data.cleaned.csv")).unwrap(),
        "Keep\n1\n"
    );
}

#[test]
fn test_delete_cols_missing_column_exits_two() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("data.csv");
    fs::write(&input, "Keep\n1\n").unwrap();

    excelmgr()
        .args(["delete-cols", input.to_str().unwrap(), "-t", "Nope"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("column_not_found"));

    assert_eq!(listing(dir.path()), vec!["data.csv"]);
}

#[test]
fn test_delete_cols_index_zero_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("data.csv");
    fs::write(&input, "A,B\n1,2\n").unwrap();

    excelmgr()
        .args(["delete-cols", input.to_str().unwrap(), "-t", "0", "--match", "index"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Validation error"));
}

#[test]
fn test_missing_input_exits_two() {
    let dir = TempDir::new().unwrap();
    excelmgr()
        .current_dir(dir.path())
        .args(["delete-cols", "nowhere.xlsx", "-t", "A"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_corrupt_workbook_exits_one() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.xlsx");
    fs::write(&input, "this is not a zip").unwrap();

    excelmgr()
        .args(["delete-cols", input.to_str().unwrap(), "-t", "A"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

// ═══════════════════════════════════════════════════════════════════════════
// COMBINE / SPLIT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_combine_then_refuse_overwrite() {
    let dir = TempDir::new().unwrap();
    write_workbook(&dir.path().join("a.xlsx"), &[("S", vec![vec!["x"], vec!["1"]])]);
    write_workbook(&dir.path().join("b.xlsx"), &[("S", vec![vec!["x"], vec!["2"]])]);
    let output = dir.path().join("out.xlsx");

    let run = || {
        let mut cmd = excelmgr();
        cmd.args([
            "combine",
            dir.path().join("a.xlsx").to_str().unwrap(),
            dir.path().join("b.xlsx").to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ]);
        cmd
    };

    run().assert().code(0);
    assert_eq!(read_back(&output)[0].1.row_count(), 2);

    run()
        .assert()
        .code(2)
        .stdout(predicate::str::contains("confirmation_required"));

    run().arg("--yes").assert().code(0);
}

#[test]
fn test_macro_policy_forbid_from_env() {
    let dir = TempDir::new().unwrap();
    write_workbook(&dir.path().join("a.xlsx"), &[("S", vec![vec!["x"], vec!["1"]])]);
    let output = dir.path().join("out.xlsm");

    excelmgr()
        .env("EXCELMGR_MACRO_POLICY", "forbid")
        .args([
            "combine",
            dir.path().to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("macro_policy_violation"));

    assert!(!output.exists());
}

#[test]
fn test_split_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("sales.xlsx");
    write_regions(&input);
    let out = dir.path().join("groups");

    excelmgr()
        .args([
            "split",
            input.to_str().unwrap(),
            "--by",
            "Region",
            "--out",
            out.to_str().unwrap(),
            "--dry-run",
        ])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("DRY RUN"))
        .stdout(predicate::str::contains("dry-run"));

    assert!(!out.exists());
}

// ═══════════════════════════════════════════════════════════════════════════
// PREVIEW AND LOGGING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_preview_prints_sample_but_never_logs_it() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("people.xlsx");
    write_workbook(
        &input,
        &[("People", vec![vec!["Name", "Code"], vec!["Zebulon", "QX-4471"]])],
    );

    excelmgr()
        .args(["preview", input.to_str().unwrap(), "--limit", "1"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("People"))
        .stdout(predicate::str::contains("Name | Code"))
        .stdout(predicate::str::contains("QX-4471"))
        .stderr(predicate::str::contains("workbook previewed"))
        .stderr(predicate::str::contains("QX-4471").not());
}

#[test]
fn test_split_never_logs_group_values() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("sites.xlsx");
    write_workbook(
        &input,
        &[(
            "Sites",
            vec![vec!["Site", "Count"], vec!["Zanzibar-8812", "3"], vec!["Oslo-4471", "5"]],
        )],
    );
    let out = dir.path().join("by_site");

    excelmgr()
        .args([
            "split",
            input.to_str().unwrap(),
            "--by",
            "Site",
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .code(0)
        .stderr(predicate::str::contains("group output"))
        .stderr(predicate::str::contains("Zanzibar-8812").not())
        .stderr(predicate::str::contains("Oslo-4471").not());

    assert_eq!(listing(&out), vec!["Oslo-4471.xlsx", "Zanzibar-8812.xlsx"]);
}

#[test]
fn test_text_log_format() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("data.csv");
    fs::write(&input, "A,B\n1,2\n").unwrap();

    excelmgr()
        .args([
            "--log-format",
            "text",
            "delete-cols",
            input.to_str().unwrap(),
            "-t",
            "B",
        ])
        .assert()
        .code(0)
        .stderr(predicate::str::contains("plan finished"))
        .stderr(predicate::str::contains("{\"").not());
}

// ═══════════════════════════════════════════════════════════════════════════
// PLAN FILES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_run_plan_file() {
    let dir = TempDir::new().unwrap();
    write_regions(&dir.path().join("sales.xlsx"));
    let plan = dir.path().join("plan.yaml");
    fs::write(
        &plan,
        r#"
operations:
  - type: split
    name: regions
    input: sales.xlsx
    by: Region
    out: regions
    format: csv
  - type: delete
    inputs: sales.xlsx
    targets: Sales
"#,
    )
    .unwrap();

    excelmgr()
        .args(["run", plan.to_str().unwrap()])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("regions (split)"));

    assert_eq!(
        listing(&dir.path().join("regions")),
        vec!["A.csv", "B.csv", "C.csv"]
    );
    assert_eq!(
        read_back(&dir.path().join("sales.cleaned.xlsx"))[0].1.columns,
        vec!["Region"]
    );
}

#[test]
fn test_run_plan_json_dry_run() {
    let dir = TempDir::new().unwrap();
    write_regions(&dir.path().join("sales.xlsx"));
    let plan = dir.path().join("plan.json");
    fs::write(
        &plan,
        r#"[{"type": "delete", "inputs": ["sales.xlsx"], "targets": ["Sales"]}]"#,
    )
    .unwrap();

    excelmgr()
        .args(["run", plan.to_str().unwrap(), "--dry-run"])
        .assert()
        .code(0);

    assert_eq!(listing(dir.path()), vec!["plan.json", "sales.xlsx"]);
}
