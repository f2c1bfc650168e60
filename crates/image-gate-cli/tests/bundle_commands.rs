// crates/image-gate-cli/tests/bundle_commands.rs
// ============================================================================
// Module: CLI Bundle and Config Command Tests
// Description: Integration tests for bundle validation, hashing, and config checks.
// Purpose: Ensure invalid inputs fail closed with explicit errors.
// Dependencies: image-gate-cli binary, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Runs the CLI binary for `bundle validate`, `bundle hash`, and
//! `config validate`.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn image_gate_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_image-gate"))
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(image_gate_bin())
        .args(args)
        .current_dir(dir)
        .env_remove("IMAGE_GATE_LANG")
        .env_remove("IMAGE_GATE_CONFIG")
        .output()
        .expect("run image-gate")
}

fn bundle() -> Value {
    json!({
        "id": "bundle-1",
        "name": "default",
        "version": "1",
        "policies": [{
            "id": "policy-1",
            "rules": [{ "gate": "PKGCHECK", "trigger": "PKGBLACKLIST", "action": "STOP" }]
        }],
        "whitelists": [{
            "id": "wl-1",
            "items": [{ "gate": "PKGCHECK", "trigger_id": "openssl-*" }]
        }],
        "mappings": [{
            "id": "map-1",
            "policy_id": "policy-1",
            "whitelist_ids": ["wl-1"],
            "registry": "*",
            "repository": "*",
            "image": { "type": "tag", "value": "*" }
        }]
    })
}

fn write_json(dir: &Path, name: &str, value: &Value) -> String {
    let path = dir.join(name);
    fs::write(&path, value.to_string()).expect("write json");
    path.to_string_lossy().into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// SECTION: Bundle Commands
// ============================================================================

/// Verifies a valid bundle is accepted with a summary.
#[test]
fn bundle_validate_accepts_valid_bundle() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_json(dir.path(), "bundle.json", &bundle());

    let output = run(dir.path(), &["bundle", "validate", "--bundlefile", &path]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("bundle-1"));
    assert!(stdout(&output).contains("1 mappings"));
}

/// Verifies unresolvable references are rejected.
#[test]
fn bundle_validate_rejects_dangling_policy() {
    let dir = TempDir::new().expect("temp dir");
    let mut value = bundle();
    value["mappings"][0]["policy_id"] = json!("missing");
    let path = write_json(dir.path(), "bundle.json", &value);

    let output = run(dir.path(), &["bundle", "validate", "--bundlefile", &path]);

    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("missing"));
}

/// Verifies schema violations are rejected.
#[test]
fn bundle_validate_rejects_schema_violation() {
    let dir = TempDir::new().expect("temp dir");
    let mut value = bundle();
    value["policies"][0]["rules"][0]["action"] = json!("DENY");
    let path = write_json(dir.path(), "bundle.json", &value);

    let output = run(dir.path(), &["bundle", "validate", "--bundlefile", &path]);

    assert_eq!(output.status.code(), Some(3));
}

/// Verifies the bundle hash ignores key order and whitespace.
#[test]
fn bundle_hash_is_canonical() {
    let dir = TempDir::new().expect("temp dir");
    let compact = write_json(dir.path(), "a.json", &bundle());
    let pretty_path = dir.path().join("b.json");
    fs::write(&pretty_path, serde_json::to_string_pretty(&bundle()).expect("pretty"))
        .expect("write pretty");
    let pretty = pretty_path.to_string_lossy().into_owned();

    let first = run(dir.path(), &["bundle", "hash", "--bundlefile", &compact]);
    let second = run(dir.path(), &["bundle", "hash", "--bundlefile", &pretty]);

    assert!(first.status.success(), "stderr: {}", stderr(&first));
    let hash = stdout(&first);
    assert!(hash.starts_with("sha256:"));
    assert_eq!(hash.trim().len(), "sha256:".len() + 64);
    assert_eq!(hash, stdout(&second));
}

/// Verifies the configured bundle size limit applies.
#[test]
fn bundle_over_size_limit_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_json(dir.path(), "bundle.json", &bundle());
    let config = dir.path().join("image-gate.toml");
    fs::write(&config, "[limits]\nmax_bundle_bytes = 16\n").expect("write config");
    let config = config.to_string_lossy().into_owned();

    let output =
        run(dir.path(), &["bundle", "validate", "--bundlefile", &path, "--config", &config]);

    assert_eq!(output.status.code(), Some(3));
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Verifies a missing default config validates as defaults.
#[test]
fn config_validate_uses_defaults_without_file() {
    let dir = TempDir::new().expect("temp dir");

    let output = run(dir.path(), &["config", "validate"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Config valid."));
}

/// Verifies an invalid config fails closed.
#[test]
fn config_validate_rejects_invalid_timeout() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("image-gate.toml");
    fs::write(&config, "[gates]\ntimeout_ms = 1\n").expect("write config");
    let config = config.to_string_lossy().into_owned();

    let output = run(dir.path(), &["config", "validate", "--config", &config]);

    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("timeout_ms"));
}

/// Verifies Catalan output carries the machine translation notice.
#[test]
fn catalan_output_is_localized() {
    let dir = TempDir::new().expect("temp dir");

    let output = run(dir.path(), &["--lang", "ca", "config", "validate"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("Configuració vàlida."));
    assert!(stderr(&output).contains("Nota:"));
}

/// Verifies argument errors use the error exit code.
#[test]
fn usage_errors_exit_three() {
    let dir = TempDir::new().expect("temp dir");

    let output = run(dir.path(), &["gate", "--image", "img-1"]);

    assert_eq!(output.status.code(), Some(3));
}
