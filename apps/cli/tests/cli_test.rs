//! Integration tests for the `jap` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const RESUME: &str = "Jane Doe\nSoftware Engineer\n- Built Rust services handling 10k rps\n- Led a team of four";
const JOB: &str = "Senior Rust Engineer. Async networking, tokio, distributed systems.";

fn jap() -> Command {
    let mut cmd = Command::cargo_bin("jap").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_inputs(temp_dir: &TempDir) -> (String, String) {
    let resume = temp_dir.path().join("resume.txt");
    let job = temp_dir.path().join("job.txt");
    fs::write(&resume, RESUME).unwrap();
    fs::write(&job, JOB).unwrap();
    (resume.to_str().unwrap().to_string(), job.to_str().unwrap().to_string())
}

#[test]
fn test_strategies_lists_builtin_ids() {
    jap()
        .arg("strategies")
        .assert()
        .success()
        .stdout(predicate::str::contains("quick-optimize"))
        .stdout(predicate::str::contains("cascade-refinement"))
        .stdout(predicate::str::contains("parallel-ensemble"));
}

#[test]
fn test_strategies_json() {
    let output = jap().arg("strategies").arg("--json").output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let strategies = value.as_array().unwrap();
    assert_eq!(strategies.len(), 7);
}

#[test]
fn test_estimate_quick_optimize() {
    jap()
        .arg("estimate")
        .arg("quick-optimize")
        .assert()
        .success()
        .stdout(predicate::str::contains("Projected cost"))
        .stdout(predicate::str::contains("Quick Optimize"));
}

#[test]
fn test_estimate_json_has_projection() {
    let output = jap().args(["estimate", "parallel-ensemble", "--json"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["strategy_id"], "parallel-ensemble");
    assert_eq!(value["estimate"]["step_count"], 4);
}

#[test]
fn test_estimate_unknown_strategy_fails() {
    jap()
        .arg("estimate")
        .arg("does-not-exist")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Strategy not found"));
}

#[test]
fn test_optimize_with_mock_providers() {
    let temp_dir = TempDir::new().unwrap();
    let (resume, job) = write_inputs(&temp_dir);

    jap()
        .args(["optimize", "quick-optimize", "--mock", "--resume", &resume, "--job", &job])
        .assert()
        .success()
        .stdout(predicate::str::contains("Optimized Resume"))
        .stdout(predicate::str::contains("succeeded"));
}

#[test]
fn test_optimize_json_reports_ledger() {
    let temp_dir = TempDir::new().unwrap();
    let (resume, job) = write_inputs(&temp_dir);

    let output = jap()
        .args(["optimize", "cascade-refinement", "--mock", "--json", "--resume", &resume, "--job", &job])
        .output()
        .unwrap();
    assert!(output.status.success());

    let run: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(run["status"], "succeeded");
    assert_eq!(run["steps"].as_array().unwrap().len(), 3);
    assert!(run["output"].is_string());
}

#[test]
fn test_optimize_ceiling_blocks_run() {
    let temp_dir = TempDir::new().unwrap();
    let (resume, job) = write_inputs(&temp_dir);

    jap()
        .args(["optimize", "cascade-refinement", "--mock", "--ceiling", "0.0001"])
        .args(["--resume", &resume, "--job", &job])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds ceiling"));
}

#[test]
fn test_optimize_missing_resume_file() {
    let temp_dir = TempDir::new().unwrap();
    let (_, job) = write_inputs(&temp_dir);
    let missing = temp_dir.path().join("nope.txt");

    jap()
        .args(["optimize", "quick-optimize", "--mock", "--job", &job])
        .arg("--resume")
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read resume"));
}

#[test]
fn test_invalid_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("pipeline.toml");
    fs::write(&config, "[retry]\nbackoff_multiplier = 0.5\n").unwrap();

    jap()
        .arg("--config")
        .arg(&config)
        .arg("strategies")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_config_disabling_model_fails_estimate() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("pipeline.toml");
    fs::write(&config, "[models.groq-mixtral-8x7b]\nenabled = false\n").unwrap();

    jap().arg("--config").arg(&config).args(["estimate", "quick-optimize"]).assert().failure();
}
