#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::Command;

fn missing_port() -> PathBuf {
    PathBuf::from(format!(
        "/tmp/simpleserial-missing-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

fn cli() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_simpleserial"));
    command.arg("--log-level").arg("error");
    command
}

#[test]
fn version_prints_package_version() {
    let output = cli().arg("version").output().expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("simpleserial {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn extended_version_reports_protocol() {
    let output = cli()
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("protocol_version: 0x01"));
    assert!(stdout.contains("max_payload: 255"));
}

#[test]
fn ports_json_is_never_empty() {
    let output = cli()
        .arg("--format")
        .arg("json")
        .arg("ports")
        .output()
        .expect("ports should run");

    // Enumeration itself can be unavailable in minimal sandboxes.
    if !output.status.success() {
        return;
    }
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("ports should emit json");
    let ports = payload
        .get("ports")
        .and_then(|v| v.as_array())
        .expect("ports array");
    assert!(!ports.is_empty());
}

#[test]
fn send_to_missing_port_fails_with_connect_error() {
    let output = cli()
        .arg("send")
        .arg(missing_port())
        .arg("--title")
        .arg("1")
        .arg("--data")
        .arg("hello")
        .output()
        .expect("send should run");

    assert!(!output.status.success());
    assert_ne!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"), "stderr: {stderr}");
}

#[test]
fn invalid_hex_is_usage_error() {
    let output = cli()
        .arg("send")
        .arg(missing_port())
        .arg("--title")
        .arg("1")
        .arg("--hex")
        .arg("abc")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn unknown_parity_is_rejected_by_parser() {
    let output = cli()
        .arg("listen")
        .arg(missing_port())
        .arg("--parity")
        .arg("mark")
        .output()
        .expect("listen should run");

    assert_eq!(output.status.code(), Some(2));
}
