//! End-to-end tests for the scorm-rte binary
//!
//! Gated behind the `integration` feature flag. Run with:
//!
//! ```sh
//! cargo test -p scorm-cli --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn scorm_rte(project_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scorm-rte"))
        .args(args)
        .env("SCORM_RTE_PROJECT_CONFIG_DIR", project_dir)
        .output()
        .expect("Failed to run scorm-rte")
}

fn project(dir: &TempDir) -> &Path {
    let config = format!(
        "[persistence]\nreplay_dir = {:?}\nbackoff_ms = [0]\n\n[storage]\ndatabase = {:?}\n",
        dir.path().join("replay"),
        dir.path().join("attempts.db"),
    );
    std::fs::write(dir.path().join("config.toml"), config).unwrap();
    dir.path()
}

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = scorm_rte(project(&dir), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("attempt"));
    assert!(stdout.contains("replay"));
    assert!(stdout.contains("config"));
}

#[test]
fn config_show_reflects_project_layer() {
    let dir = TempDir::new().unwrap();
    let output = scorm_rte(project(&dir), &["config", "show"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[persistence]"));
    assert!(stdout.contains("attempts.db"));
}

#[test]
fn scripted_session_is_persisted_and_resumable() {
    let dir = TempDir::new().unwrap();
    let project = project(&dir);
    let script = dir.path().join("calls.json");
    std::fs::write(
        &script,
        r#"[
            {"call": "LMSInitialize", "args": [""]},
            {"call": "LMSSetValue", "args": ["cmi.suspend_data", "page3"]},
            {"call": "LMSSetValue", "args": ["cmi.core.exit", "suspend"]},
            {"call": "LMSFinish", "args": [""]}
        ]"#,
    )
    .unwrap();
    let script = script.to_string_lossy().to_string();

    let run = scorm_rte(
        project,
        &["run", "--user", "u1", "--package", "p1", "--version", "1.2", "--script", &script],
    );
    assert!(run.status.success(), "{}", String::from_utf8_lossy(&run.stderr));
    let stdout = String::from_utf8_lossy(&run.stdout);
    assert!(stdout.contains(r#"LMSFinish("") = "true" [error 0]"#));

    let attempt = scorm_rte(project, &["attempt", "--user", "u1", "--package", "p1"]);
    assert!(attempt.status.success());
    let json: serde_json::Value = serde_json::from_slice(&attempt.stdout).unwrap();
    assert_eq!(json["suspend_data"], "page3");
    assert_eq!(json["exit"], "suspend");
    assert!(json["terminated_at"].is_null());
}

#[test]
fn replay_on_empty_queue_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let output = scorm_rte(project(&dir), &["replay"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Replay queue is empty"));
}
