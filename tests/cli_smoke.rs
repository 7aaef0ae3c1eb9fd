//! Smoke tests for the pgwarden binary
//! These tests check argument parsing, configuration errors and one real cleanup run.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::{tempdir, TempDir};

/// Returns the path to the CLI binary (builds if needed)
fn cli_bin(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pgwarden").expect("binary should build");
    cmd.current_dir(cwd).env_remove("RUST_LOG");
    cmd
}

/// A config whose directories all live under a fresh temp dir.
fn write_config(root: &TempDir) -> std::path::PathBuf {
    let path = root.path().join("pgwarden.yaml");
    let dir = |name: &str| {
        let dir = root.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        dir.display().to_string()
    };
    let yaml = format!(
        "postgres:\n  data_dir: {}\nbackup:\n  only_remains_days: 7\n  full_backup_dir: {}\n  wal_archive_dir: {}\n  wal_archive_backup_dir: {}\n",
        dir("data"),
        dir("b"),
        dir("wal"),
        root.path().join("archive").display()
    );
    fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn prints_help() {
    let dir = tempdir().unwrap();
    cli_bin(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--incremental"));
}

#[test]
fn prints_version() {
    let dir = tempdir().unwrap();
    cli_bin(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pgwarden"));
}

#[test]
fn rejects_unknown_flag() {
    let dir = tempdir().unwrap();
    cli_bin(dir.path())
        .arg("--not-a-real-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn missing_config_file_is_fatal() {
    let dir = tempdir().unwrap();
    cli_bin(dir.path())
        .args(["--no-log-file", "-c"])
        .arg(dir.path().join("absent.yaml"))
        .arg("-r")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn daemon_without_intervals_keeps_running() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir);
    cli_bin(dir.path())
        .arg("--no-log-file")
        .arg("-c")
        .arg(&config)
        .timeout(Duration::from_secs(3))
        .assert()
        .interrupted()
        .stderr(predicate::str::contains("No job interval configured"));
}

#[test]
fn out_of_range_interval_is_a_startup_error() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir);
    cli_bin(dir.path())
        .arg("--no-log-file")
        .arg("-c")
        .arg(&config)
        .env("PGWARDEN__BACKUP__FULL_BACKUP_INTERVAL", "9000000000000000000")
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn remove_deletes_only_expired_files() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir);
    let data_dir = dir.path().join("data");
    let expired = data_dir.join("old.backup");
    File::create(&expired)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(30 * 24 * 3600))
        .unwrap();
    fs::write(data_dir.join("fresh.backup"), b"").unwrap();

    cli_bin(dir.path())
        .arg("-c")
        .arg(&config)
        .arg("-r")
        .assert()
        .success();

    assert!(!expired.exists());
    assert!(data_dir.join("fresh.backup").exists());

    let log = fs::read_to_string(dir.path().join("backup.log")).unwrap();
    assert!(log.contains("Removed old backup file"));
}
