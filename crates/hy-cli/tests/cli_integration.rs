//! CLI integration tests
//!
//! Tests the hydra CLI using assert_cmd. The run tests start real local
//! agents and executors from the built binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn hydra() -> Command {
    Command::cargo_bin("hydra")
        .expect("Failed to locate hydra binary - ensure it's built before running tests")
}

/// Write a config running `command` on one local agent, with the duration
/// report kept inside `dir`
fn write_config(dir: &Path, command: &str, executors: usize) -> std::path::PathBuf {
    let path = dir.join("hydra.toml");
    let text = format!(
        "command = {:?}\nheuristic_file = {:?}\nboot_timeout = 20\n\n[[agents]]\ntype = \"local\"\nexecutors = {}\n",
        command,
        dir.join("heuristics.json").display().to_string(),
        executors
    );
    std::fs::write(&path, text).unwrap();
    path
}

fn write_items(dir: &Path, names: &[&str]) {
    for name in names {
        std::fs::write(dir.join(name), "").unwrap();
    }
}

#[test]
fn test_cli_help() {
    hydra()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Distributed test-file dispatcher"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("executor").not());
}

#[test]
fn test_cli_version() {
    hydra()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hydra"));
}

#[test]
fn test_run_requires_patterns() {
    hydra().arg("run").assert().failure();
}

#[test]
fn test_run_all_passing() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "true {}", 2);
    write_items(dir.path(), &["a_test.rb", "b_test.rb", "c_test.rb"]);

    hydra()
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["run", "*_test.rb"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hydra Testing:"))
        .stdout(predicate::str::contains("Hydra Completed"))
        .stdout(predicate::str::contains("3 passed, 0 failed, 0 unknown"));

    let report = std::fs::read_to_string(dir.path().join("heuristics.json")).unwrap();
    assert!(report.contains("a_test.rb"));
    assert!(report.contains("c_test.rb"));
}

#[test]
fn test_run_with_failures_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "false", 1);
    write_items(dir.path(), &["broken_test.rb"]);

    hydra()
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["run", "--progress", "broken_test.rb"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("broken_test.rb"))
        .stdout(predicate::str::contains("0 passed, 1 failed"));
}

#[test]
fn test_run_with_no_matches_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "true", 1);

    hydra()
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["run", "--quiet", "missing/*.rb"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 items"));
}

#[test]
fn test_run_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hydra.toml");
    std::fs::write(&path, "[[agents]]\ntype = \"ssh\"\nexecutors = 1\n").unwrap();

    hydra()
        .current_dir(dir.path())
        .args(["run", "x.rb"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_run_with_missing_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();

    hydra()
        .current_dir(dir.path())
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .args(["run", "x.rb"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_sync_without_sync_section() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "true", 1);

    hydra()
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[sync]"));
}

#[test]
fn test_executor_role_over_stdio() {
    let input = concat!(
        "{\"v\":1,\"type\":\"assign_work\",\"item\":\"a.rb\"}\n",
        "{\"v\":1,\"type\":\"shutdown\"}\n",
    );

    hydra()
        .args(["executor", "--command", "true"])
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"type\":\"request_work\""))
        .stdout(predicate::str::contains("\"type\":\"work_result\""))
        .stdout(predicate::str::contains("\"item\":\"a.rb\""))
        .stdout(predicate::str::contains("\"output\":\".\""));
}
