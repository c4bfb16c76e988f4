//! CLI end-to-end tests
//!
//! Tests for the camkeep command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the camkeep binary
#[allow(deprecated)]
fn camkeep_cmd() -> Command {
    let mut cmd = Command::cargo_bin("camkeep").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("camkeep.json");
    fs::write(&path, body).unwrap();
    path
}

const VALID: &str = r#"{
    "root_path": "/srv/cctv",
    "segment": {"length_secs": 600, "wrap": 500},
    "cameras": [
        {"name": "front", "ip": "10.0.0.2", "username": "admin", "password": "secret",
         "onvif_port": 8000, "reboot_on_failure": true,
         "streams": [{"name": "main", "path": "/stream1"}, {"name": "sub", "path": "/stream2"}]},
        {"name": "yard", "ip": "10.0.0.3", "username": "admin", "password": "secret",
         "streams": [{"name": "main", "path": "/live"}]}
    ]
}"#;

#[test]
fn test_cli_no_args_shows_help() {
    camkeep_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_lists_commands() {
    camkeep_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("capture"))
        .stdout(predicate::str::contains("repair"))
        .stdout(predicate::str::contains("check-tools"));
}

#[test]
fn test_cli_version_command() {
    camkeep_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "camkeep {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_repair_help() {
    camkeep_cmd()
        .args(["repair", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--once"));
}

#[test]
fn test_cli_validate_summarizes_config() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), VALID);

    camkeep_cmd()
        .arg("--config")
        .arg(&config)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("/srv/cctv/capture"))
        .stdout(predicate::str::contains("Cameras: 2"))
        .stdout(predicate::str::contains("front (10.0.0.2): streams [main, sub], reboot on failure"))
        .stdout(predicate::str::contains("secret").not());
}

#[test]
fn test_cli_validate_prints_warnings() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), r#"{"cameras": []}"#);

    camkeep_cmd()
        .args(["validate", "-c"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Warnings"));
}

#[test]
fn test_cli_validate_rejects_bad_wrap() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), r#"{"segment": {"wrap": 1}}"#);

    camkeep_cmd()
        .arg("-c")
        .arg(&config)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("wrap"));
}

#[test]
fn test_cli_missing_config_file() {
    let dir = tempdir().unwrap();

    camkeep_cmd()
        .arg("-c")
        .arg(dir.path().join("nope.json"))
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_cli_check_tools_json() {
    let dir = tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"{"tools": {"ffmpeg_path": "/nonexistent/ffmpeg", "untrunc_path": "/nonexistent/untrunc"}}"#,
    );

    let output = camkeep_cmd()
        .arg("-c")
        .arg(&config)
        .args(["check-tools", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let tools: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ffmpeg", "untrunc"]);
}

#[test]
fn test_cli_check_tools_command() {
    camkeep_cmd()
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("untrunc"));
}

#[test]
fn test_cli_repair_once_requires_untrunc() {
    let dir = tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &format!(
            r#"{{"root_path": "{}", "tools": {{"untrunc_path": "/nonexistent/untrunc"}}}}"#,
            dir.path().display()
        ),
    );

    // An empty PATH guarantees neither tool is found.
    camkeep_cmd()
        .env("PATH", "")
        .arg("-c")
        .arg(&config)
        .args(["repair", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[cfg(unix)]
#[test]
fn test_cli_repair_once_with_fake_tools() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir_all(&bin).unwrap();
    for tool in ["ffmpeg", "untrunc"] {
        let path = bin.join(tool);
        fs::write(&path, "#!/bin/sh\nexit 1\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    let config = write_config(
        dir.path(),
        &format!(
            r#"{{"root_path": "{}",
                "tools": {{"ffmpeg_path": "{}", "untrunc_path": "{}"}},
                "cameras": [{{"name": "front", "ip": "10.0.0.2",
                              "streams": [{{"name": "main", "path": "/s"}}]}}]}}"#,
            dir.path().display(),
            bin.join("ffmpeg").display(),
            bin.join("untrunc").display()
        ),
    );

    camkeep_cmd()
        .arg("-c")
        .arg(&config)
        .args(["repair", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("front: checked 0"));
}
