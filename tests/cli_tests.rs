//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

fn node_cmd() -> Command {
    let mut cmd = Command::cargo_bin("beacon-node").unwrap();
    // Keep the developer's environment out of the results
    for key in [
        "BEACON_CONFIG",
        "BEACON_NODE_NAME",
        "BEACON_NODE_ADDRESS",
        "BEACON_PEERS",
        "BEACON_LOG_LEVEL",
        "BEACON_LOG_FILE",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    node_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Beacon node"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_flag() {
    node_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("beacon-node"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_fixture() {
    node_cmd()
        .args(["config", "show", "--config"])
        .arg(common::valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("[node]"))
        .stdout(predicate::str::contains("address = 5002"))
        .stdout(predicate::str::contains("[peers.gamma]"))
        .stdout(predicate::str::contains("[transport]"))
        .stdout(predicate::str::contains("[logging]"));
}

#[test]
fn test_config_validate_fixture() {
    node_cmd()
        .args(["config", "validate", "--config"])
        .arg(common::valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("3 peers"));
}

#[test]
fn test_config_validate_invalid_fixture() {
    node_cmd()
        .args(["config", "validate", "--config"])
        .arg(common::invalid_config_fixture())
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("peers.alpha.port"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    node_cmd()
        .args(["config", "validate", "--config", "/nonexistent/path/node.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"))
        .stderr(predicate::str::contains("config init"));
}

#[test]
fn test_config_init_help() {
    node_cmd()
        .args(["config", "init", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--path"))
        .stdout(predicate::str::contains("--force"));
}

// ─────────────────────────────────────────────────────────────────
// Run Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_run_help() {
    node_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run the node"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--peers"))
        .stdout(predicate::str::contains("--heartbeat-ms"));
}

#[test]
fn test_run_with_missing_config() {
    node_cmd()
        .args(["run", "--config", "/nonexistent/node.toml"])
        .assert()
        .failure()
        .code(10);
}

#[test]
fn test_run_with_bad_peer_list() {
    node_cmd()
        .args(["run", "--config"])
        .arg(common::valid_config_fixture())
        .args(["--peers", "alpha"])
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("--peers"));
}

#[test]
fn test_run_with_invalid_config() {
    node_cmd()
        .args(["run", "--config"])
        .arg(common::invalid_config_fixture())
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────
// Verbosity Flag Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flags_accepted() {
    for flag in ["-v", "-vv", "--quiet"] {
        node_cmd()
            .arg(flag)
            .args(["config", "validate", "--config"])
            .arg(common::valid_config_fixture())
            .assert()
            .success();
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_command() {
    node_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    node_cmd().assert().failure();
}
