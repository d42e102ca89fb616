//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory, so the
//! snapshot written by one command is what the next command restores.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_tasktide-cli"))
        .args(args)
        .env("TASKTIDE_DATA_DIR", data_dir)
        .env_remove("TASKTIDE_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(data_dir: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("stdout is a single JSON document")
}

#[test]
fn test_status_defaults_to_idle_focus() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["mode"], "pomodoro");
    assert_eq!(status["remainingSeconds"], 1500);
    assert_eq!(status["isRunning"], false);
    assert_eq!(status["atDefault"], true);
    assert_eq!(status["display"], "25:00");
    assert!(status["endTime"].is_null());
}

#[test]
fn test_start_survives_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let event = run_json(dir.path(), &["timer", "start", "--mode", "short-break"]);
    assert_eq!(event["type"], "timer_started");
    assert_eq!(event["mode"], "shortBreak");

    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["mode"], "shortBreak");
    assert_eq!(status["isRunning"], true);
    let left = status["remainingSeconds"].as_u64().unwrap();
    assert!((290..=300).contains(&left), "unexpected remaining {left}");
    assert!(status["endTime"].is_i64());
}

#[test]
fn test_pause_twice_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    run_json(dir.path(), &["timer", "start"]);
    let first = run_json(dir.path(), &["timer", "pause"]);
    assert_eq!(first["type"], "timer_paused");
    let second = run_json(dir.path(), &["timer", "pause"]);
    assert!(second.is_null());

    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["isRunning"], false);
}

#[test]
fn test_toggle_and_mode_switch() {
    let dir = tempfile::tempdir().unwrap();
    let started = run_json(dir.path(), &["timer", "toggle"]);
    assert_eq!(started["type"], "timer_started");
    let paused = run_json(dir.path(), &["timer", "toggle"]);
    assert_eq!(paused["type"], "timer_paused");

    let changed = run_json(dir.path(), &["timer", "mode", "long"]);
    assert_eq!(changed["type"], "mode_changed");
    assert_eq!(changed["to"], "longBreak");
    assert_eq!(changed["remaining_secs"], 900);

    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["display"], "15:00");
}

#[test]
fn test_reset_uses_configured_duration() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["config", "set", "timer.focus_secs", "600"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("ok"));

    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "timer.focus_secs"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "600");

    let event = run_json(dir.path(), &["timer", "reset", "--mode", "focus"]);
    assert_eq!(event["type"], "timer_reset");
    assert_eq!(event["remaining_secs"], 600);
}

#[test]
fn test_watch_exits_immediately_when_idle() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(dir.path(), &["timer", "watch", "--mode", "short-break"]);
    assert_eq!(code, 0, "watch failed: {stderr}");
    let line: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(line["mode"], "shortBreak");
    assert_eq!(line["isRunning"], false);
}

#[test]
fn test_invalid_mode_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["timer", "start", "--mode", "nap"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown timer mode"));
}

#[test]
fn test_config_rejects_unknown_key_and_zero_duration() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["config", "get", "timer.nope"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Unknown configuration key: timer.nope"));

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "timer.short_break_secs", "0"]);
    assert_ne!(code, 0);
}
