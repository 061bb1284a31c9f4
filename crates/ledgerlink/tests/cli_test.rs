//! Integration tests for the `ledgerlink` CLI binary.
//!
//! Argument parsing, help output, completions, config management against a
//! temporary file, and backend commands against a wiremock server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `ledgerlink` binary with env isolation.
///
/// Clears all `LEDGERLINK_*` env vars and points the config file at
/// `config` so tests never touch the user's real configuration.
fn ledgerlink_cmd(config: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ledgerlink");
    cmd.env("HOME", "/tmp/ledgerlink-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/ledgerlink-cli-test-nonexistent")
        .env("LEDGERLINK_CONFIG", config)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("LEDGERLINK_PROFILE")
        .env_remove("LEDGERLINK_API_URL")
        .env_remove("LEDGERLINK_TOKEN")
        .env_remove("LEDGERLINK_OUTPUT")
        .env_remove("LEDGERLINK_INSECURE")
        .env_remove("LEDGERLINK_TIMEOUT");
    cmd
}

/// A command aimed at `api_url`. The explicit token keeps the keyring out
/// of the lookup chain.
fn backend_cmd(dir: &tempfile::TempDir, api_url: &str) -> assert_cmd::Command {
    let mut cmd = ledgerlink_cmd(&dir.path().join("config.toml"));
    cmd.args(["--api-url", api_url, "--token", "test-token"]);
    cmd
}

/// Run a blocking command from inside an async test.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// A port nothing listens on.
fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = ledgerlink_cmd(&dir.path().join("config.toml")).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = format!("{}{}", stdout(&output), stderr(&output));
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let dir = tempfile::tempdir().unwrap();
    ledgerlink_cmd(&dir.path().join("config.toml"))
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("listen")
                .and(predicate::str::contains("send"))
                .and(predicate::str::contains("request"))
                .and(predicate::str::contains("status")),
        );
}

#[test]
fn test_version_flag() {
    let dir = tempfile::tempdir().unwrap();
    ledgerlink_cmd(&dir.path().join("config.toml"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ledgerlink"));
}

#[test]
fn test_completions_bash() {
    let dir = tempfile::tempdir().unwrap();
    ledgerlink_cmd(&dir.path().join("config.toml"))
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_listen_count_must_be_positive() {
    let dir = tempfile::tempdir().unwrap();
    ledgerlink_cmd(&dir.path().join("config.toml"))
        .args(["listen", "/ws/orders", "--count", "0"])
        .assert()
        .code(2);
}

// ── Missing / invalid configuration ─────────────────────────────────

#[test]
fn test_no_backend_configured() {
    let dir = tempfile::tempdir().unwrap();
    ledgerlink_cmd(&dir.path().join("config.toml"))
        .args(["request", "get", "/invoices"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No backend configured"));
}

#[test]
fn test_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();
    ledgerlink_cmd(&dir.path().join("config.toml"))
        .args(["--profile", "staging", "status"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn test_non_http_api_url_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    backend_cmd(&dir, "ftp://erp.example.com")
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("api_url"));
}

// ── Config management ───────────────────────────────────────────────

#[test]
fn test_config_set_show_and_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    ledgerlink_cmd(&config)
        .args(["config", "set", "api_url", "https://erp.example.com/api/v1"])
        .assert()
        .success();
    ledgerlink_cmd(&config)
        .args(["config", "set", "token", "plaintext-secret"])
        .assert()
        .success();

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("https://erp.example.com/api/v1"));

    ledgerlink_cmd(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[profiles.default]")
                .and(predicate::str::contains("token = \"****\""))
                .and(predicate::str::contains("plaintext-secret").not()),
        );

    ledgerlink_cmd(&config)
        .args(["-o", "json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plaintext-secret").not());

    ledgerlink_cmd(&config)
        .args(["-o", "plain", "config", "profiles"])
        .assert()
        .success()
        .stdout("default\n");
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let dir = tempfile::tempdir().unwrap();
    ledgerlink_cmd(&dir.path().join("config.toml"))
        .args(["config", "set", "colour", "red"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown config key"));
}

#[test]
fn test_config_use_missing_profile() {
    let dir = tempfile::tempdir().unwrap();
    ledgerlink_cmd(&dir.path().join("config.toml"))
        .args(["config", "use", "prod"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("prod"));
}

#[test]
fn test_config_path_honours_override() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    ledgerlink_cmd(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

// ── Status ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_status_reports_online_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut cmd = backend_cmd(&dir, &server.uri());
    cmd.args(["-o", "json", "status"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["is_online"], json!(true));
    assert_eq!(report["http_status"], json!(200));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_for_unreachable_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = backend_cmd(&dir, &dead_url());
    cmd.args(["-o", "plain", "status"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(7));
    assert_eq!(stdout(&output).trim(), "offline");
}

// ── Request ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_request_get_prints_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/invoices/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "paid": true})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut cmd = backend_cmd(&dir, &format!("{}/api", server.uri()));
    cmd.args(["-o", "json-compact", "request", "get", "/invoices/42"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), r#"{"id":42,"paid":true}"#);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "accepted"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut cmd = backend_cmd(&dir, &server.uri());
    cmd.args([
        "-o",
        "plain",
        "request",
        "post",
        "/payments",
        "--data",
        r#"{"amount":1200}"#,
        "--retry-delay-ms",
        "10",
    ]);
    let output = run(cmd).await;

    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), r#"{"status":"accepted"}"#);
    assert!(stderr(&output).contains("Retrying"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/invoices/9"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut cmd = backend_cmd(&dir, &server.uri());
    cmd.args(["request", "delete", "/invoices/9"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(4), "stderr:\n{}", stderr(&output));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_while_offline_is_queued() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = backend_cmd(&dir, &dead_url());
    cmd.args(["request", "get", "/invoices"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(9), "stderr:\n{}", stderr(&output));
    assert!(stderr(&output).contains("Queued for later"));
}
