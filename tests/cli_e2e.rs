//! End-to-end CLI tests for the bookloft binary.

use assert_cmd::Command;
use predicates::prelude::*;

/// Binary with an isolated config home and no signing-related env.
fn bookloft(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("bookloft").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env_remove("APP_ENV")
        .env_remove("APP_SIGNING_SECRET")
        .env_remove("RUST_LOG");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let home = tempfile::tempdir().unwrap();
    bookloft(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("open-access books"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("search"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let home = tempfile::tempdir().unwrap();
    bookloft(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bookloft"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = tempfile::tempdir().unwrap();
    bookloft(home.path())
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that search requires at least one term.
#[test]
fn test_search_without_query_fails() {
    let home = tempfile::tempdir().unwrap();
    bookloft(home.path())
        .arg("search")
        .assert()
        .failure()
        .stderr(predicate::str::contains("QUERY"));
}

/// Test that an unknown key in an explicit config file aborts startup.
#[test]
fn test_unknown_config_key_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("bookloft.conf");
    std::fs::write(&config, "# local overrides\nprobe_budget = 5\nbogus_key = 1\n").unwrap();

    bookloft(home.path())
        .arg("--config")
        .arg(&config)
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("bogus_key"));
}

/// Test that a missing explicit config file is reported.
#[test]
fn test_missing_config_file_is_reported() {
    let home = tempfile::tempdir().unwrap();
    bookloft(home.path())
        .arg("--config")
        .arg(home.path().join("absent.conf"))
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

/// Test that serving outside dev mode without a signing secret fails fast.
#[test]
fn test_serve_without_signing_secret_fails() {
    let home = tempfile::tempdir().unwrap();
    bookloft(home.path())
        .args(["serve", "--bind", "127.0.0.1:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("APP_SIGNING_SECRET"));
}
