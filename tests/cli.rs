use assert_cmd::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Command;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    let selection = dir.join("selection.json");
    fs::write(
        &path,
        format!("selection_file: {}\n", selection.display()),
    )
    .expect("write config");
    path
}

fn tabcast(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tabcast").expect("tabcast binary");
    cmd.env_remove("RUST_LOG")
        .env("TABCAST_CHROME", "/nonexistent/chrome")
        .env("TABCAST_SKIP_OS_PATHS", "1")
        .arg("--config")
        .arg(config);
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("utf8 output");
    serde_json::from_str(&stdout).expect("valid json")
}

#[test]
fn sites_lists_builtin_strategies() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let assert = tabcast(&config)
        .args(["--output", "json", "sites"])
        .assert()
        .success();
    let value = stdout_json(assert.get_output());

    let sites = value["sites"].as_array().expect("sites array");
    assert_eq!(sites.len(), 8);
    let claude = sites
        .iter()
        .find(|site| site["site"] == "claude.ai")
        .expect("claude entry");
    assert_eq!(claude["protocol"]["kind"], "content_editable");
    assert_eq!(value["default"]["protocol"]["kind"], "plain_input");
}

#[test]
fn selection_round_trips_through_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    tabcast(&config)
        .args(["selection", "set", "claude", "https://chat.mistral.ai/chat"])
        .assert()
        .success();

    let stored: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("selection.json")).unwrap())
            .unwrap();
    assert_eq!(stored["selectedServices"][0], "https://claude.ai/new");

    let assert = tabcast(&config)
        .args(["--output", "json", "selection", "show"])
        .assert()
        .success();
    let value = stdout_json(assert.get_output());
    assert_eq!(value["selectedServices"].as_array().unwrap().len(), 2);

    tabcast(&config)
        .args(["selection", "clear"])
        .assert()
        .success();
    assert!(!dir.path().join("selection.json").exists());
}

#[test]
fn send_rejects_blank_text_before_launching() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let assert = tabcast(&config)
        .args(["send", "--text", "   ", "--to", "claude"])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("broadcast text is empty"), "{stderr}");
    assert!(!dir.path().join("selection.json").exists());
}

#[test]
fn send_without_destinations_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let assert = tabcast(&config)
        .args(["send", "--text", "hello"])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("no destinations selected"), "{stderr}");
}

#[test]
fn send_without_browser_reports_it() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    // a PATH without any browser on it
    let assert = tabcast(&config)
        .env("PATH", dir.path())
        .args(["send", "--text", "hello", "--to", "claude", "--no-save"])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("no Chrome/Chromium found"), "{stderr}");
    assert!(!dir.path().join("selection.json").exists());
}

#[test]
fn send_validates_inline_start_command() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let assert = tabcast(&config)
        .args([
            "send",
            "--command-json",
            r#"{"action":"startTyping","text":"  ","destinations":["claude"]}"#,
        ])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("broadcast text is empty"), "{stderr}");
    assert!(!dir.path().join("selection.json").exists());
}

#[test]
fn send_reads_start_command_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let assert = assert_cmd::Command::from_std(tabcast(&config))
        .args(["send", "--command-json", "-"])
        .write_stdin(r#"{"action":"typeText","text":"hello"}"#)
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("invalid startTyping command"), "{stderr}");
}
