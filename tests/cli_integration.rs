//! Integration tests for the credvault CLI.
//!
//! These tests exercise the binary end-to-end using `assert_cmd`. Each
//! test runs in its own temp directory with a fresh master key in the
//! environment, so the SQLite database lands under that directory.

use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;

const MASTER_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

/// Helper: get a Command pointing at the credvault binary.
fn credvault() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("credvault").expect("binary should exist")
}

/// Helper: a command bound to `dir` with the test master key.
fn vault_cmd(dir: &TempDir) -> Command {
    let mut cmd = credvault();
    cmd.current_dir(dir.path())
        .env("CREDVAULT_MASTER_KEY", MASTER_KEY)
        .env("CREDVAULT_ACTOR", "ci")
        .env_remove("CREDVAULT_TENANT")
        .env_remove("CREDVAULT_LOG");
    cmd
}

fn create_openai(dir: &TempDir) {
    vault_cmd(dir)
        .args(["create", "openai", "--type", "api_key", "--field", "api_key=sk-test-123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created api_key credential 'openai'"));
}

#[test]
fn help_flag_shows_usage() {
    credvault()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Multi-tenant credential vault"))
        .stdout(predicate::str::contains("keygen"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("rotate"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("mask"));
}

#[test]
fn no_args_shows_help() {
    credvault()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn keygen_prints_a_32_byte_base64_key() {
    let output = credvault().arg("keygen").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let key = stdout.lines().next().unwrap().trim();
    // 32 bytes encode to 44 base64 characters.
    assert_eq!(key.len(), 44);
    assert!(key.ends_with('='));
}

#[test]
fn types_lists_required_fields() {
    credvault()
        .args(["types", "postgres"])
        .assert()
        .success()
        .stdout(predicate::str::contains("postgres"))
        .stdout(predicate::str::contains("database"));
}

#[test]
fn missing_master_key_is_reported() {
    let tmp = TempDir::new().unwrap();
    credvault()
        .current_dir(tmp.path())
        .env_remove("CREDVAULT_MASTER_KEY")
        .args(["list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CREDVAULT_MASTER_KEY"));
}

#[test]
fn create_then_get_roundtrip() {
    let tmp = TempDir::new().unwrap();
    create_openai(&tmp);

    assert!(tmp.path().join(".credvault/credentials.db").exists());

    vault_cmd(&tmp)
        .args(["get", "openai", "--field", "api_key"])
        .assert()
        .success()
        .stdout("sk-test-123\n");
}

#[test]
fn invalid_payload_is_rejected_without_echoing_it() {
    let tmp = TempDir::new().unwrap();
    vault_cmd(&tmp)
        .args(["create", "db", "--type", "postgres", "--field", "host=db.internal"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("username"))
        .stderr(predicate::str::contains("db.internal").not());
}

#[test]
fn rotate_and_history() {
    let tmp = TempDir::new().unwrap();
    create_openai(&tmp);

    vault_cmd(&tmp)
        .args(["rotate", "openai", "--field", "api_key=sk-test-456", "--reason", "leak"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version 1"));

    vault_cmd(&tmp)
        .args(["get", "openai", "--field", "api_key"])
        .assert()
        .success()
        .stdout("sk-test-456\n");

    vault_cmd(&tmp)
        .args(["history", "openai"])
        .assert()
        .success()
        .stdout(predicate::str::contains("leak"));
}

#[test]
fn tenants_are_isolated() {
    let tmp = TempDir::new().unwrap();
    create_openai(&tmp);

    vault_cmd(&tmp)
        .args(["--tenant", "globex", "get", "openai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn list_json_has_no_secret_material() {
    let tmp = TempDir::new().unwrap();
    create_openai(&tmp);

    vault_cmd(&tmp)
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"openai\""))
        .stdout(predicate::str::contains("sk-test-123").not());
}

#[test]
fn mask_redacts_values_from_stdin() {
    let tmp = TempDir::new().unwrap();
    create_openai(&tmp);

    vault_cmd(&tmp)
        .args(["mask", "openai"])
        .write_stdin("Authorization: Bearer sk-test-123\n")
        .assert()
        .success()
        .stdout("Authorization: Bearer [REDACTED]\n");
}

#[test]
fn delete_with_force_then_audit() {
    let tmp = TempDir::new().unwrap();
    create_openai(&tmp);

    vault_cmd(&tmp)
        .args(["delete", "openai", "--force"])
        .assert()
        .success();

    vault_cmd(&tmp)
        .args(["get", "openai"])
        .assert()
        .failure();

    vault_cmd(&tmp)
        .args(["audit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("ci"));
}
