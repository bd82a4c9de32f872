//! Basic CLI smoke tests.
//!
//! Invokes the binary via cargo run and checks argument parsing; commands
//! that would touch the user's database are only exercised through --help.

use std::process::Command;

fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "studyos-cli", "--"])
        .args(args)
        .output()
        .expect("failed to execute CLI");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);
    (stdout, stderr, code)
}

#[test]
fn top_level_help_lists_command_groups() {
    let (stdout, _, code) = run_cli(&["--help"]);
    assert_eq!(code, 0);
    for group in [
        "timer",
        "task",
        "timeline",
        "study",
        "wellbeing",
        "notify",
        "achievements",
        "serve",
    ] {
        assert!(stdout.contains(group), "missing command group {group}");
    }
}

#[test]
fn timer_help_shows_actions() {
    let (stdout, _, code) = run_cli(&["timer", "--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("start"));
    assert!(stdout.contains("stop"));
    assert!(stdout.contains("status"));
}

#[test]
fn timeline_plan_requires_arguments() {
    let (_, stderr, code) = run_cli(&["timeline", "plan"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("required") || stderr.contains("Usage"));
}

#[test]
fn unknown_command_fails() {
    let (_, _, code) = run_cli(&["frobnicate"]);
    assert_ne!(code, 0);
}
