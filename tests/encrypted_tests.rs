//! Encrypted (MS-OFFCRYPTO Agile) sources: decryption, credentials, cleanup

mod common;

use common::{listing, read_back, workbook_bytes};
use excelmgr::config::Settings;
use excelmgr::credentials::{Credential, PasswordMap};
use excelmgr::crypto::{self, DecryptError};
use excelmgr::executor::{Executor, Outcome, RunReport};
use excelmgr::plan::{
    build_combine_plan, build_delete_plan, build_preview_plan, CombineOptions, CredentialArgs,
    DeleteOptions, PreviewOptions,
};
use ms_offcrypto_writer::Ecma376AgileWriter;
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, SeedableRng as _};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PASSWORD: &str = "correct horse battery staple";

fn encrypt(plain: &[u8], password: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    let mut rng = StdRng::from_seed([7u8; 32]);
    let mut agile = Ecma376AgileWriter::create(&mut rng, password, &mut cursor).unwrap();
    agile.write_all(plain).unwrap();
    agile.finalize().unwrap();
    cursor.into_inner()
}

fn encrypted_book(dir: &Path, name: &str, password: &str) -> PathBuf {
    let plain = workbook_bytes(&[(
        "Secret",
        vec![vec!["Name", "Salary"], vec!["Ada", "100"], vec!["Grace", "120"]],
    )]);
    let path = dir.join(name);
    fs::write(&path, encrypt(&plain, password)).unwrap();
    path
}

fn delete_salary(input: &Path, credentials: CredentialArgs) -> RunReport {
    let opts = DeleteOptions {
        inputs: vec![input.to_path_buf()],
        targets: vec!["Salary".to_string()],
        credentials,
        ..Default::default()
    };
    let plan = build_delete_plan(&opts, &Settings::default())
        .unwrap()
        .validate()
        .unwrap();
    Executor::new(Settings::default()).execute(&plan).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// DECRYPTOR
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_decrypt_round_trip() {
    let plain = workbook_bytes(&[("S", vec![vec!["x"], vec!["1"]])]);
    let encrypted = encrypt(&plain, PASSWORD);

    assert!(crypto::is_encrypted(&encrypted));
    assert!(!crypto::is_encrypted(&plain));
    assert_eq!(crypto::decrypt(&encrypted, PASSWORD).unwrap(), plain);
}

#[test]
fn test_decrypt_wrong_password() {
    let plain = workbook_bytes(&[("S", vec![vec!["x"]])]);
    let encrypted = encrypt(&plain, PASSWORD);
    assert!(matches!(
        crypto::decrypt(&encrypted, "wrong"),
        Err(DecryptError::WrongPassword)
    ));
}

#[test]
fn test_tampered_package_fails_integrity_check() {
    let plain = workbook_bytes(&[("S", vec![vec!["x"], vec!["1"]])]);
    let mut ole = cfb::CompoundFile::open(Cursor::new(encrypt(&plain, PASSWORD))).unwrap();
    let mut package = Vec::new();
    ole.open_stream("EncryptedPackage")
        .unwrap()
        .read_to_end(&mut package)
        .unwrap();
    let last = package.len() - 1;
    package[last] ^= 0xFF;
    ole.create_stream("EncryptedPackage")
        .unwrap()
        .write_all(&package)
        .unwrap();
    ole.flush().unwrap();
    let tampered = ole.into_inner().into_inner();

    assert!(matches!(
        crypto::decrypt(&tampered, PASSWORD),
        Err(DecryptError::IntegrityMismatch)
    ));
}

#[test]
fn test_decrypt_unicode_password() {
    let plain = workbook_bytes(&[("S", vec![vec!["x"]])]);
    let encrypted = encrypt(&plain, "pässwörd-密码");
    assert_eq!(crypto::decrypt(&encrypted, "pässwörd-密码").unwrap(), plain);
}

#[test]
fn test_unlocked_copy_is_removed_on_drop() {
    let dir = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let source = encrypted_book(dir.path(), "secret.xlsx", PASSWORD);

    let unlocked = crypto::unlock(&source, PASSWORD, Some(staging.path())).unwrap();
    let staged = unlocked.path().to_path_buf();
    assert!(staged.starts_with(staging.path()));
    assert_eq!(read_back(&staged)[0].1.columns, vec!["Name", "Salary"]);

    drop(unlocked);
    assert!(!staged.exists());
    assert!(listing(staging.path()).is_empty());
}

#[test]
fn test_unlock_without_temp_dir_uses_system_temp() {
    let dir = TempDir::new().unwrap();
    let source = encrypted_book(dir.path(), "secret.xlsx", PASSWORD);

    let unlocked = crypto::unlock(&source, PASSWORD, None).unwrap();
    assert!(unlocked.path().starts_with(std::env::temp_dir()));
    assert_eq!(listing(dir.path()), vec!["secret.xlsx"]);
}

#[test]
fn test_combine_encrypted_source_into_other_directory() {
    let sources = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    encrypted_book(sources.path(), "secret.xlsx", PASSWORD);
    let output = out.path().join("combined.xlsx");

    let opts = CombineOptions {
        inputs: vec![sources.path().to_path_buf()],
        output: output.clone(),
        credentials: CredentialArgs {
            password: Some(PASSWORD.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let plan = build_combine_plan(&opts, &Settings::default())
        .unwrap()
        .validate()
        .unwrap();
    let report = Executor::new(Settings::default()).execute(&plan).unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(read_back(&output)[0].1.row_count(), 2);
    assert_eq!(listing(sources.path()), vec!["secret.xlsx"]);
    assert_eq!(listing(out.path()), vec!["combined.xlsx"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// EXECUTION WITH CREDENTIALS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_delete_on_encrypted_source_with_literal_password() {
    let dir = TempDir::new().unwrap();
    let input = encrypted_book(dir.path(), "secret.xlsx", PASSWORD);

    let report = delete_salary(
        &input,
        CredentialArgs {
            password: Some(PASSWORD.to_string()),
            ..Default::default()
        },
    );

    assert_eq!(report.exit_code(), 0);
    let (_, table) = &read_back(&dir.path().join("secret.cleaned.xlsx"))[0];
    assert_eq!(table.columns, vec!["Name"]);
    assert_eq!(table.row_count(), 2);
    // No decrypted copy is left beside the source
    assert_eq!(listing(dir.path()), vec!["secret.cleaned.xlsx", "secret.xlsx"]);
}

#[test]
fn test_missing_credential_fails_file() {
    let dir = TempDir::new().unwrap();
    let input = encrypted_book(dir.path(), "secret.xlsx", PASSWORD);

    let report = delete_salary(&input, CredentialArgs::default());
    assert_eq!(report.exit_code(), 2);
    assert!(matches!(
        &report.results[0].outcome,
        Outcome::Failed { kind: "credential_missing", .. }
    ));
}

#[test]
fn test_wrong_password_fails_with_decryption_error() {
    let dir = TempDir::new().unwrap();
    let input = encrypted_book(dir.path(), "secret.xlsx", PASSWORD);

    let report = delete_salary(
        &input,
        CredentialArgs {
            password: Some("nope".to_string()),
            ..Default::default()
        },
    );
    match &report.results[0].outcome {
        Outcome::Failed { kind, reason } => {
            assert_eq!(*kind, "decryption");
            assert!(!reason.contains("nope"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_password_map_by_file_name() {
    let dir = TempDir::new().unwrap();
    encrypted_book(dir.path(), "one.xlsx", "first");
    encrypted_book(dir.path(), "two.xlsx", "second");
    let map = dir.path().join("passwords.csv");
    fs::write(&map, "Path,Password\none.xlsx,first\ntwo.xlsx,second\n").unwrap();

    let opts = DeleteOptions {
        inputs: vec![dir.path().to_path_buf()],
        targets: vec!["Salary".to_string()],
        credentials: CredentialArgs {
            password_map: Some(map),
            ..Default::default()
        },
        ..Default::default()
    };
    let plan = build_delete_plan(&opts, &Settings::default())
        .unwrap()
        .validate()
        .unwrap();
    let report = Executor::new(Settings::default()).execute(&plan).unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.count("written"), 2);
}

#[test]
fn test_inline_password_map_missing_entry() {
    let dir = TempDir::new().unwrap();
    let input = encrypted_book(dir.path(), "secret.xlsx", PASSWORD);

    let mut passwords = BTreeMap::new();
    passwords.insert("other.xlsx".to_string(), PASSWORD.to_string());
    let report = delete_salary(
        &input,
        CredentialArgs {
            passwords: Some(passwords),
            ..Default::default()
        },
    );
    assert!(matches!(
        &report.results[0].outcome,
        Outcome::Failed { kind: "credential_missing", .. }
    ));
}

#[test]
fn test_preview_marks_encrypted_workbook() {
    let dir = TempDir::new().unwrap();
    let input = encrypted_book(dir.path(), "secret.xlsx", PASSWORD);

    let opts = PreviewOptions {
        path: input,
        limit: Some(1),
        credentials: CredentialArgs {
            password: Some(PASSWORD.to_string()),
            ..Default::default()
        },
    };
    let plan = build_preview_plan(&opts, &Settings::default())
        .unwrap()
        .validate()
        .unwrap();
    let report = Executor::new(Settings::default()).execute(&plan).unwrap();

    let preview = &report.previews[0];
    assert!(preview.encrypted);
    assert_eq!(preview.sheets[0].headers, vec!["Name", "Salary"]);
    assert_eq!(preview.sheets[0].rows, 2);
    assert_eq!(preview.sheets[0].sample, vec![vec!["Ada".to_string(), "100".to_string()]]);
}

#[test]
fn test_password_map_lookup_falls_back_to_file_name() {
    let mut map = PasswordMap::new();
    map.insert("q1.xlsx", "q1");
    let credential = Credential::Template(map);

    let secret = credential.password_for(Path::new("elsewhere/q1.xlsx")).unwrap();
    assert_eq!(secret.as_str(), "q1");
}
