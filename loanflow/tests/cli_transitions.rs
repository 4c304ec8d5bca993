//! CLI tests for the offline `transitions`, `check-transition` and
//! `config init` commands.
//!
//! Spawns the loanflow binary and verifies output and exit codes.

use std::process::Command;

use loanflow::exit_codes;
use loanflow::io::config::{LoanflowConfig, load_config};

fn loanflow() -> Command {
    Command::new(env!("CARGO_BIN_EXE_loanflow"))
}

#[test]
fn check_transition_accepts_permitted_move() {
    let status = loanflow()
        .args(["check-transition", "--from", "draft", "--to", "SUBMITTED", "--role", "Client"])
        .status()
        .expect("loanflow check-transition");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn check_transition_rejects_with_allowed_set() {
    let output = loanflow()
        .args(["check-transition", "--from", "draft", "--to", "approved", "--role", "client"])
        .output()
        .expect("loanflow check-transition");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("allowed: under_kam_review, withdrawn"));
}

#[test]
fn unknown_role_is_invalid() {
    let output = loanflow()
        .args(["transitions", "--from", "draft", "--role", "intern"])
        .output()
        .expect("loanflow transitions");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown role 'intern'"));
}

/// Credit sees the administrative close alongside graph edges.
#[test]
fn transitions_lists_close_override_for_credit() {
    let output = loanflow()
        .args(["transitions", "--from", "in_negotiation", "--role", "credit team"])
        .output()
        .expect("loanflow transitions");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["sent_to_nbfc", "rejected", "withdrawn", "closed"]);
}

#[test]
fn config_init_writes_defaults_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("loanflow.toml");

    let status = loanflow()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .status()
        .expect("loanflow config init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), LoanflowConfig::default());

    let status = loanflow()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .status()
        .expect("loanflow config init again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
