//! CLI integration tests

use std::process::Command;

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "scalectl", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Tier Autoscaler"), "Should show app name");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new("cargo")
        .args(["run", "-p", "scalectl", "--", "--version"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("scalectl"), "Should show binary name");
}

/// Test status subcommand help
#[test]
fn test_status_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "scalectl", "--", "status", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Status help should succeed");
    assert!(stdout.contains("[SERVICE]"), "Should show optional service argument");
}

/// Test that an unreachable daemon is reported as an error
#[test]
fn test_status_unreachable_daemon_fails() {
    let output = Command::new("cargo")
        .args([
            "run",
            "-p",
            "scalectl",
            "--",
            "--api-url",
            "http://127.0.0.1:9",
            "status",
        ])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unreachable API should fail");
}

/// Test that an unknown format is rejected
#[test]
fn test_invalid_format_rejected() {
    let output = Command::new("cargo")
        .args(["run", "-p", "scalectl", "--", "--format", "xml", "health"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("invalid value"));
}
