//! CLI tests for the `overseer` binary.
//!
//! Spawns the binary and checks stdout and exit codes for the offline
//! subcommands plus a short shell-backed session.

use std::fs;
use std::process::Command;

use overseer::exit_codes;
use overseer::io::config::{OverseerConfig, load_config};
use serde_json::Value;

fn overseer() -> Command {
    Command::new(env!("CARGO_BIN_EXE_overseer"))
}

#[test]
fn detect_prints_category() {
    for (target, expected) in [
        ("192.168.1.0/24", "ip"),
        ("https://example.com", "url"),
        ("./loot", "path"),
        ("example.com", "domain"),
    ] {
        let output = overseer().args(["detect", target]).output().expect("detect");
        assert_eq!(output.status.code(), Some(exit_codes::OK));
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), expected);
    }
}

#[test]
fn plan_prints_phased_tasks() {
    let output = overseer()
        .args(["plan", "10.0.0.1", "--mode", "stealth"])
        .output()
        .expect("plan");
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let preview: Value = serde_json::from_slice(&output.stdout).expect("plan json");
    assert_eq!(preview["category"], "ip");
    let tasks = preview["tasks"].as_array().expect("tasks");
    assert_eq!(tasks.len(), 3);
    assert!(
        tasks
            .iter()
            .all(|t| t["command"].as_str().is_some_and(|c| c.starts_with("RUN nmap")))
    );
}

#[test]
fn check_exit_code_reflects_approval() {
    let status = overseer()
        .args(["check", "RUN rm -rf /tmp/x", "--autonomy", "autonomous"])
        .status()
        .expect("check");
    assert_eq!(status.code(), Some(exit_codes::APPROVAL_REQUIRED));

    let status = overseer()
        .args([
            "check",
            "RUN nmap -sn 10.0.0.1",
            "--autonomy",
            "semi-autonomous",
            "--kind",
            "planning",
        ])
        .status()
        .expect("check");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn check_rejects_unknown_autonomy() {
    let status = overseer()
        .args(["check", "RUN id", "--autonomy", "reckless"])
        .status()
        .expect("check");
    assert_ne!(status.code(), Some(exit_codes::OK));
}

#[test]
fn init_config_writes_defaults_and_refuses_overwrite() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("overseer.toml");

    let status = overseer()
        .arg("init-config")
        .arg("--path")
        .arg(&path)
        .status()
        .expect("init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), OverseerConfig::default());

    let status = overseer()
        .arg("init-config")
        .arg("--path")
        .arg(&path)
        .status()
        .expect("init-config again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = overseer()
        .arg("init-config")
        .arg("--path")
        .arg(&path)
        .arg("--force")
        .status()
        .expect("init-config force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn run_path_session_writes_exports() {
    let temp = tempfile::tempdir().expect("tempdir");
    let scan_dir = temp.path().join("scan");
    fs::create_dir_all(&scan_dir).expect("scan dir");
    fs::write(scan_dir.join("notes.txt"), "hello\n").expect("seed file");

    let config = temp.path().join("overseer.toml");
    fs::write(
        &config,
        "[worker]\ndispatch_delay_ms = 1\nidle_delay_ms = 10\n\n[ota]\nenabled = false\n",
    )
    .expect("config");
    let report = temp.path().join("report.json");
    let findings = temp.path().join("findings.json");

    let output = overseer()
        .arg("run")
        .arg(&scan_dir)
        .arg("--config")
        .arg(&config)
        .arg("--report")
        .arg(&report)
        .arg("--findings")
        .arg(&findings)
        .args(["--timeout-secs", "60"])
        .output()
        .expect("run");
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let status: Value = serde_json::from_slice(&output.stdout).expect("status json");
    assert_eq!(status["phase"], "completed");
    // Retries of a missing tool add queue items, never remove them.
    assert!(status["queue"]["total"].as_u64().is_some_and(|n| n >= 3));

    let findings: Value =
        serde_json::from_str(&fs::read_to_string(&findings).expect("read findings"))
            .expect("findings json");
    assert!(
        findings
            .as_array()
            .expect("array")
            .iter()
            .any(|f| f["description"].as_str().is_some_and(|d| d.contains("notes.txt")))
    );
    let report: Value =
        serde_json::from_str(&fs::read_to_string(&report).expect("read report"))
            .expect("report json");
    assert_eq!(report["summary"]["total"], 1);
}
