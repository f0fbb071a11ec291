//! Integration tests for the `blaze` CLI binary.
//!
//! Scripts run against the in-memory store; config paths point into a
//! temp directory so tests never touch the user's real configuration.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use pretty_assertions::assert_eq;

// ── Helpers ─────────────────────────────────────────────────────────

fn blaze_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("blaze");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env("BLAZE_CONFIG", home.join("config.toml"))
        .env_remove("BLAZE_OUTPUT")
        .env_remove("BLAZE_INSTANCE")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn stdout_lines(output: &std::process::Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = blaze_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "Expected 'Usage' in:\n{stderr}");
}

#[test]
fn test_help_lists_subcommands() {
    let home = tempfile::tempdir().unwrap();
    blaze_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("config"))
            .and(predicate::str::contains("completions")),
    );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    blaze_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("blaze"));
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    blaze_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_env() {
    let home = tempfile::tempdir().unwrap();
    let expected = home.path().join("config.toml");
    blaze_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn test_config_show_redacts_api_keys() {
    let home = tempfile::tempdir().unwrap();
    write(
        home.path(),
        "config.toml",
        r#"
default_instance = "local"

[instances.local]
database_url = "https://local.example.com"
project_id = "local-project"
api_key = "super-secret"
"#,
    );

    blaze_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("local-project")
                .and(predicate::str::contains("********"))
                .and(predicate::str::contains("super-secret").not()),
        );
}

// ── Run ─────────────────────────────────────────────────────────────

#[test]
fn test_run_prints_outcomes_and_watch_events() {
    let home = tempfile::tempdir().unwrap();
    let script = write(
        home.path(),
        "script.jsonl",
        "{\"tag\": \"Set\", \"refPath\": \"users/1\", \"value\": {\"name\": \"a\"}}\n\
         {\"tag\": \"SignInAnonymously\", \"category\": \"login\"}\n",
    );

    let output = blaze_cmd(home.path())
        .arg("run")
        .arg(&script)
        .args(["--watch", "users"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(r#""command":"Set""#), "{stdout}");
    assert!(stdout.contains(r#""command":"SignInAnonymously""#), "{stdout}");
    assert!(stdout.contains(r#""type":"credential""#), "{stdout}");
    assert!(stdout.contains(r#""watch":"users""#), "{stdout}");
    assert!(stdout.contains(r#"{"1":{"name":"a"}}"#), "{stdout}");
}

#[test]
fn test_run_category_filter() {
    let home = tempfile::tempdir().unwrap();
    let script = write(
        home.path(),
        "script.jsonl",
        "{\"tag\": \"Set\", \"refPath\": \"a\", \"value\": 1}\n\
         {\"tag\": \"SignInAnonymously\", \"category\": \"login\"}\n\
         {\"tag\": \"Remove\", \"refPath\": \"a\"}\n",
    );

    let output = blaze_cmd(home.path())
        .arg("run")
        .arg(&script)
        .args(["--category", "login"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1, "{lines:?}");
    assert!(lines[0].contains(r#""category":"login""#));
    assert!(lines[0].contains(r#""index":1"#));
}

#[test]
fn test_run_reads_seed_document() {
    let home = tempfile::tempdir().unwrap();
    let seed = write(home.path(), "seed.json", r#"{"rooms": {"lobby": {"topic": "hi"}}}"#);
    let script = write(
        home.path(),
        "script.jsonl",
        "{\"tag\": \"Remove\", \"refPath\": \"rooms/lobby/topic\"}\n",
    );

    let output = blaze_cmd(home.path())
        .arg("run")
        .arg(&script)
        .arg("--seed")
        .arg(&seed)
        .args(["--watch", "rooms/lobby"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let watched: Vec<String> = stdout_lines(&output)
        .into_iter()
        .filter(|line| line.contains(r#""watch":"rooms/lobby""#))
        .collect();
    assert_eq!(watched.len(), 2, "{watched:?}");
    assert!(watched[0].contains(r#""value":{"topic":"hi"}"#), "{watched:?}");
    assert!(watched[1].contains(r#""value":null"#), "{watched:?}");
}

#[test]
fn test_run_failed_command_sets_exit_code() {
    let home = tempfile::tempdir().unwrap();
    let script = write(
        home.path(),
        "script.jsonl",
        "{\"tag\": \"Set\", \"refPath\": \"a\", \"value\": 1}\n\
         {\"tag\": \"Teleport\"}\n",
    );

    let output = blaze_cmd(home.path())
        .arg("run")
        .arg(&script)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].contains(r#""status":"ok""#));
    assert!(lines[1].contains(r#""status":"error""#));
    assert!(lines[1].contains("Teleport"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 of 2 commands failed"), "{stderr}");
}

#[test]
fn test_run_rejects_malformed_script() {
    let home = tempfile::tempdir().unwrap();
    let script = write(home.path(), "script.jsonl", "{\"refPath\": \"a\"}\n");

    blaze_cmd(home.path())
        .arg("run")
        .arg(&script)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("line 1"));
}

#[test]
fn test_run_unknown_instance() {
    let home = tempfile::tempdir().unwrap();
    let script = write(home.path(), "script.jsonl", "");

    blaze_cmd(home.path())
        .arg("run")
        .arg(&script)
        .args(["--instance", "prod"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("prod"));
}
