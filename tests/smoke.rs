//! Smoke tests -- verify the binary runs and each subcommand responds.

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("traffic-sentinel").unwrap();
    // Keep host configuration out of the tests.
    cmd.env("TRAFFIC_SENTINEL_CONFIG", "/nonexistent/traffic-sentinel.toml");
    cmd
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Network-traffic anomaly detection engine"));
}

#[test]
fn test_cli_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("traffic-sentinel"));
}

#[test]
fn test_classify_boundaries() {
    cli()
        .args(["classify", "--score", "25"])
        .assert()
        .success()
        .stdout("SUSPICIOUS\n");
    cli()
        .args(["classify", "--score", "80"])
        .assert()
        .success()
        .stdout("CRITICAL\n");
}

#[test]
fn test_detect_at_means_is_normal() {
    cli()
        .args(["detect", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"classification\": \"NORMAL\""))
        .stdout(predicate::str::contains("\"scoringPath\": \"statistical\""));
}

#[test]
fn test_detect_flood_is_critical() {
    cli()
        .args(["detect", "--packet-rate", "12000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Classification: CRITICAL"));
}

#[test]
fn test_detect_rejects_invalid_features() {
    cli()
        .args(["detect", "--time-of-day", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeOfDayFactor"));
}

#[test]
fn test_detect_with_training() {
    cli()
        .args(["detect", "--train", "--epochs", "2", "--samples", "40", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"scoringPath\": \"reconstruction\""));
}

#[test]
fn test_simulate_json() {
    let output = cli()
        .args(["simulate", "--count", "8", "--seed", "3", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 8);
    assert!(rows[0]["result"]["score"].is_number());
}

#[test]
fn test_simulate_rejects_bad_rate() {
    cli()
        .args(["simulate", "--anomaly-rate", "2"])
        .assert()
        .failure();
}

#[test]
fn test_simulate_rejects_oversized_count() {
    cli()
        .args(["simulate", "--count", "18446744073709551615"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--count"));
    cli()
        .args(["simulate", "--count", "0"])
        .assert()
        .failure();
}

#[test]
fn test_config_prints_defaults() {
    cli()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[training]"))
        .stdout(predicate::str::contains("epochs = 50"));
}

#[test]
fn test_config_file_is_honored() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[training]\nepochs = 7\n").unwrap();

    cli()
        .args(["--config", path.to_str().unwrap(), "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("epochs = 7"));
}
