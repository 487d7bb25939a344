//! Integration tests for the `relaydesk` CLI binary.
//!
//! Argument parsing, help output, completions and error handling run
//! without a store; the session tests point the binary at a wiremock
//! server.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `relaydesk` binary with env isolation.
///
/// Clears all `RELAYDESK_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn relaydesk_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("relaydesk");
    cmd.env("HOME", "/tmp/relaydesk-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/relaydesk-cli-test-nonexistent")
        .env_remove("RELAYDESK_PROFILE")
        .env_remove("RELAYDESK_ENDPOINT")
        .env_remove("RELAYDESK_EMAIL")
        .env_remove("RELAYDESK_PASSWORD")
        .env_remove("RELAYDESK_OUTPUT")
        .env_remove("RELAYDESK_INSECURE")
        .env_remove("RELAYDESK_TIMEOUT");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// A store that accepts `ana@example.com` and knows her as `role`.
async fn store_with_account(role: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/sign-in"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uid": "u-1",
            "email": "ana@example.com",
            "token": "tok-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/documents/users/u-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-1",
            "fields": {"email": "ana@example.com", "role": role}
        })))
        .mount(&server)
        .await;
    server
}

/// Run the binary against `server` off the async runtime.
async fn run_against(server: &MockServer, args: &[&str]) -> std::process::Output {
    let endpoint = server.uri();
    let args: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
    tokio::task::spawn_blocking(move || {
        relaydesk_cmd()
            .args(["--endpoint", &endpoint])
            .args(["--email", "ana@example.com", "--password", "pw"])
            .args(&args)
            .output()
            .unwrap()
    })
    .await
    .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = relaydesk_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    relaydesk_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("clients")
            .and(predicate::str::contains("chat"))
            .and(predicate::str::contains("campaign")),
    );
}

#[test]
fn test_version_flag() {
    relaydesk_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("relaydesk"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    relaydesk_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    relaydesk_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = relaydesk_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    let output = relaydesk_cmd()
        .args(["--output", "xml", "whoami"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_clients_list_without_store() {
    let output = relaydesk_cmd().args(["clients", "list"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let text = combined_output(&output);
    assert!(
        text.contains("No store configured"),
        "Expected a missing-config error:\n{text}"
    );
}

#[test]
fn test_unknown_profile_is_reported() {
    let output = relaydesk_cmd()
        .args(["--profile", "nope", "whoami"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("Profile 'nope' not found"));
}

#[test]
fn test_bad_endpoint_is_a_usage_error() {
    let output = relaydesk_cmd()
        .args(["--endpoint", "not a url", "--email", "a@b.io", "--password", "x"])
        .arg("whoami")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path() {
    relaydesk_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_defaults() {
    relaydesk_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[defaults]"));
}

#[test]
fn test_config_profiles_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("relaydesk");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        r#"
default_profile = "prod"

[profiles.prod]
endpoint = "https://store.example.com"
email = "op@example.com"
password = "hunter2"
"#,
    )
    .unwrap();

    let output = relaydesk_cmd()
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["config", "show"])
        .output()
        .unwrap();
    let text = combined_output(&output);
    assert!(output.status.success(), "config show failed:\n{text}");
    assert!(text.contains("[profiles.prod]"));
    assert!(!text.contains("hunter2"));

    relaydesk_cmd()
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["config", "profiles", "-o", "plain"])
        .assert()
        .success()
        .stdout("prod\n");
}

// ── Session ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_whoami_reports_customer_role() {
    let server = store_with_account("customer").await;

    let output = run_against(&server, &["-o", "json", "whoami"]).await;
    let text = combined_output(&output);
    assert!(output.status.success(), "whoami failed:\n{text}");

    let profile: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(profile["id"], "u-1");
    assert_eq!(profile["role"], "customer");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_customer_cannot_list_clients() {
    let server = store_with_account("customer").await;

    let output = run_against(&server, &["clients", "list"]).await;
    assert_eq!(output.status.code(), Some(5));
    assert!(combined_output(&output).contains("needs an operator account"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_password_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/sign-in"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "INVALID_PASSWORD"})),
        )
        .mount(&server)
        .await;

    let output = run_against(&server, &["whoami"]).await;
    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("INVALID_PASSWORD"));
}
