//! CLI smoke tests against a temporary configuration

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn setup() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = dir.path().join("workunit.yml");
    let yaml = format!(
        "store:\n  path: {}\n  lock-timeout-ms: 500\nplayground: {}\ntracker:\n  token-env: WORKUNIT_CLI_TEST_TOKEN_NEVER_SET\nidentity:\n  provider: static\n  email: dev@acme.io\n",
        dir.path().join("work-db.yaml").display(),
        dir.path().join("playground").display(),
    );
    fs::write(&config, yaml).expect("Failed to write config");
    (dir, config)
}

fn wu(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("wu").expect("binary exists");
    cmd.env("XDG_DATA_HOME", dir.path().join("data"))
        .env("HOME", dir.path())
        .current_dir(dir.path());
    cmd
}

#[test]
fn test_list_empty_store() {
    let (dir, config) = setup();

    wu(&dir)
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No open units of work."));
}

#[test]
fn test_list_json_is_an_array() {
    let (dir, config) = setup();

    wu(&dir)
        .arg("--config")
        .arg(&config)
        .args(["--json", "list"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn test_detail_of_unknown_key_exits_not_found() {
    let (dir, config) = setup();

    wu(&dir)
        .arg("--config")
        .arg(&config)
        .args(["detail", "work-acme/widgets/42"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("work-acme/widgets/42"));
}

#[test]
fn test_tracker_commands_require_token() {
    let (dir, config) = setup();

    wu(&dir)
        .arg("--config")
        .arg(&config)
        .args(["status", "work-acme/widgets/42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WORKUNIT_CLI_TEST_TOKEN_NEVER_SET"));
}

#[test]
fn test_create_requires_an_issue() {
    let (dir, config) = setup();

    wu(&dir)
        .arg("--config")
        .arg(&config)
        .arg("create")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ISSUE"));
}

#[test]
fn test_resume_works_without_token_and_reports_unknown_key() {
    let (dir, config) = setup();

    wu(&dir)
        .arg("--config")
        .arg(&config)
        .args(["resume", "work-acme/widgets/42"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("work-acme/widgets/42"))
        .stderr(predicate::str::contains("WORKUNIT_CLI_TEST_TOKEN_NEVER_SET").not());
}
