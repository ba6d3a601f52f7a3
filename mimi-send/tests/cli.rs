//! Integration tests for the mimi-send binary
//!
//! Only startup paths that fail before any network access are exercised here.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn mimi_send(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mimi-send").unwrap();
    // Keep a developer's .env and secrets out of the test
    cmd.current_dir(dir.path())
        .env_remove("MIMICAST_PASSWORD")
        .env_remove("MIMICAST_API_KEY")
        .env("MIMICAST_LOG_LEVEL", "error");
    cmd
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    mimi_send(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mimi-send"));
}

#[test]
fn test_help_mentions_exit_codes() {
    let dir = TempDir::new().unwrap();
    mimi_send(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_rejects_unknown_flags() {
    let dir = TempDir::new().unwrap();
    mimi_send(&dir).arg("--once").assert().failure();
}

#[test]
fn test_missing_config_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    mimi_send(&dir)
        .env("MIMICAST_CONFIG", dir.path().join("absent.toml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_invalid_config_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[account]
username = "agent"
password = "pw"

[targets]
style = []
content = []

[provider]
service = "deepseek"
api_key = "sk"

[agent]
persona = "p"
"#,
    )
    .unwrap();

    mimi_send(&dir)
        .env("MIMICAST_CONFIG", &path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("targets.style or targets.content"));
}

#[test]
fn test_missing_password_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[account]
username = "agent"

[targets]
style = ["@voice"]

[provider]
service = "chatgpt"
api_key = "sk"

[agent]
persona = "p"
"#,
    )
    .unwrap();

    mimi_send(&dir)
        .env("MIMICAST_CONFIG", &path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("account.password"));
}
