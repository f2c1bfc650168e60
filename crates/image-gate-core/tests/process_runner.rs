// crates/image-gate-core/tests/process_runner.rs
// ============================================================================
// Module: Process Gate Runner Tests
// Description: Runs shell-script gates through the process runner.
// Purpose: Validate the gate executable contract and its failure modes.
// Dependencies: image-gate-core, tempfile
// ============================================================================

//! ## Overview
//! Each test writes a small `/bin/sh` gate into a temp directory and runs it
//! through [`ProcessGateRunner`], alone or inside a full evaluation.

#![cfg(unix)]
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

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use image_gate_core::Action;
use image_gate_core::CancellationToken;
use image_gate_core::EvaluationContext;
use image_gate_core::EvaluationError;
use image_gate_core::EvaluationOptions;
use image_gate_core::GateError;
use image_gate_core::GateInvocation;
use image_gate_core::GateName;
use image_gate_core::GateRequest;
use image_gate_core::GateRunner;
use image_gate_core::GlobalWhitelist;
use image_gate_core::ImageId;
use image_gate_core::LedgerStore;
use image_gate_core::Policy;
use image_gate_core::PolicyId;
use image_gate_core::PolicyRule;
use image_gate_core::TriggerName;
use image_gate_core::Verdict;
use image_gate_core::runtime::FileGateOutputStore;
use image_gate_core::runtime::FileLedgerStore;
use image_gate_core::runtime::GateExecutables;
use image_gate_core::runtime::NoopLogSink;
use image_gate_core::runtime::ProcessGateRunner;
use image_gate_core::runtime::evaluate_image_policy;
use image_gate_core::runtime::gate::DEFAULT_MAX_OUTPUT_BYTES;
use image_gate_core::runtime::gate::GateWorkspace;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn write_gate(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();
    path
}

struct Fixture {
    dir: TempDir,
    workspace: GateWorkspace,
    cancel: CancellationToken,
    image_id: ImageId,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("gates")).unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        let image_id = ImageId::new("img-1");
        let workspace = GateWorkspace::create(&dir.path().join("work"), &image_id).unwrap();
        Self {
            dir,
            workspace,
            cancel: CancellationToken::new(),
            image_id,
        }
    }

    fn gates_dir(&self) -> PathBuf {
        self.dir.path().join("gates")
    }

    fn run(
        &self,
        runner: &ProcessGateRunner,
        gate: &str,
        params: &[&str],
        timeout: Duration,
    ) -> Result<image_gate_core::RawGateOutput, GateError> {
        let data_dir = self.dir.path().join("data");
        let request = GateRequest {
            image_id: &self.image_id,
            image_list_file: self.workspace.image_list_file(),
            data_store_dir: &data_dir,
            output_dir: self.workspace.output_dir(),
            timeout,
            cancel: &self.cancel,
        };
        let invocation = GateInvocation {
            gate: GateName::new(gate),
            params: params.iter().map(|param| (*param).to_string()).collect(),
        };
        runner.run(&invocation, &request)
    }
}

fn runner_for(dir: &Path) -> ProcessGateRunner {
    ProcessGateRunner::new(GateExecutables::new(dir), DEFAULT_MAX_OUTPUT_BYTES)
}

// ============================================================================
// SECTION: Runner Contract
// ============================================================================

/// Verifies the gate receives its arguments and its output file is read.
#[test]
fn gate_receives_contract_arguments() {
    let fixture = Fixture::new();
    write_gate(
        &fixture.gates_dir(),
        "pkgcheck",
        "id=$(cat \"$1\")\necho \"ARGS $id $4 $5\" > \"$3/PKGCHECK\"\necho progress",
    );
    let output = fixture
        .run(&runner_for(&fixture.gates_dir()), "PKGCHECK", &["a=1", "b=2"], Duration::from_secs(10))
        .unwrap();
    assert_eq!(String::from_utf8(output.bytes).unwrap(), "ARGS img-1 a=1 b=2\n");
    assert_eq!(output.diagnostics, "progress");
}

/// Verifies a non-zero exit is reported with captured diagnostics.
#[test]
fn nonzero_exit_is_an_error() {
    let fixture = Fixture::new();
    write_gate(&fixture.gates_dir(), "pkgcheck", "echo broken >&2\nexit 4");
    let err = fixture
        .run(&runner_for(&fixture.gates_dir()), "PKGCHECK", &[], Duration::from_secs(10))
        .unwrap_err();
    match err {
        GateError::ExitStatus {
            code,
            diagnostics,
            ..
        } => {
            assert_eq!(code, Some(4));
            assert_eq!(diagnostics, "broken");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Verifies a successful exit without an output file is an error.
#[test]
fn missing_output_is_an_error() {
    let fixture = Fixture::new();
    write_gate(&fixture.gates_dir(), "pkgcheck", "exit 0");
    let err = fixture
        .run(&runner_for(&fixture.gates_dir()), "PKGCHECK", &[], Duration::from_secs(10))
        .unwrap_err();
    assert!(matches!(err, GateError::MissingOutput { .. }));
}

/// Verifies oversized output is rejected before it is read.
#[test]
fn oversized_output_is_rejected() {
    let fixture = Fixture::new();
    write_gate(&fixture.gates_dir(), "pkgcheck", "printf '0123456789abcdef' > \"$3/PKGCHECK\"");
    let runner = ProcessGateRunner::new(GateExecutables::new(fixture.gates_dir()), 8);
    let err = fixture.run(&runner, "PKGCHECK", &[], Duration::from_secs(10)).unwrap_err();
    assert!(matches!(
        err,
        GateError::OutputTooLarge {
            size: 16,
            limit: 8,
            ..
        }
    ));
}

/// Verifies a slow gate is killed at its deadline.
#[test]
fn slow_gate_times_out() {
    let fixture = Fixture::new();
    write_gate(&fixture.gates_dir(), "pkgcheck", "sleep 30");
    let started = Instant::now();
    let err = fixture
        .run(&runner_for(&fixture.gates_dir()), "PKGCHECK", &[], Duration::from_millis(200))
        .unwrap_err();
    assert!(matches!(err, GateError::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(20));
}

/// Verifies a cancelled evaluation kills the running gate.
#[test]
fn cancelled_gate_is_killed() {
    let fixture = Fixture::new();
    write_gate(&fixture.gates_dir(), "pkgcheck", "sleep 30");
    fixture.cancel.cancel();
    let err = fixture
        .run(&runner_for(&fixture.gates_dir()), "PKGCHECK", &[], Duration::from_secs(60))
        .unwrap_err();
    assert!(matches!(err, GateError::Cancelled(_)));
}

/// Verifies gates without an executable are unknown.
#[test]
fn unknown_gate_is_reported() {
    let fixture = Fixture::new();
    let err = fixture
        .run(&runner_for(&fixture.gates_dir()), "NOSUCHGATE", &[], Duration::from_secs(10))
        .unwrap_err();
    assert!(matches!(err, GateError::UnknownGate(_)));
}

/// Verifies gate names cannot escape the gates directory.
#[test]
fn gate_names_with_path_components_are_rejected() {
    let fixture = Fixture::new();
    let marker = fixture.dir.path().join("escaped");
    write_gate(fixture.dir.path(), "evil", &format!("touch '{}'", marker.display()));
    let runner = runner_for(&fixture.gates_dir());

    for gate in ["../EVIL", "sub/evil", ".."] {
        let err = fixture.run(&runner, gate, &[], Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, GateError::InvalidName(_)), "gate {gate}: {err}");
    }
    assert!(!marker.exists());
    assert!(!fixture.dir.path().join("work").join("EVIL.stdout").exists());
}

/// Verifies explicit executables cannot be registered under unsafe names.
#[test]
fn explicit_executable_requires_valid_name() {
    let fixture = Fixture::new();
    let custom = write_gate(fixture.dir.path(), "custom", "echo custom > \"$3/X\"");
    let executables =
        GateExecutables::new(fixture.gates_dir()).with_executable(GateName::new("../X"), custom);
    let err = executables.resolve(&GateName::new("../X")).unwrap_err();
    assert!(matches!(err, GateError::InvalidName(_)));
}

/// Verifies explicit executables take precedence over the gates directory.
#[test]
fn explicit_executable_overrides_directory() {
    let fixture = Fixture::new();
    write_gate(&fixture.gates_dir(), "pkgcheck", "echo dir > \"$3/PKGCHECK\"");
    let custom = write_gate(fixture.dir.path(), "custom", "echo custom > \"$3/PKGCHECK\"");
    let executables =
        GateExecutables::new(fixture.gates_dir()).with_executable(GateName::new("PKGCHECK"), custom);
    let runner = ProcessGateRunner::new(executables, DEFAULT_MAX_OUTPUT_BYTES);
    let output = fixture.run(&runner, "PKGCHECK", &[], Duration::from_secs(10)).unwrap();
    assert_eq!(output.bytes, b"custom\n");
}

// ============================================================================
// SECTION: End-to-End
// ============================================================================

/// Verifies a full evaluation persists gate output and the image ledger.
#[test]
fn evaluation_with_process_gates_persists_state() {
    let dir = TempDir::new().unwrap();
    let gates = dir.path().join("gates");
    fs::create_dir_all(&gates).unwrap();
    write_gate(
        &gates,
        "pkgcheck",
        "echo 'PKGBLACKLIST {\"id\":\"openssl-1\",\"desc\":\"openssl is blacklisted\"}' > \"$3/PKGCHECK\"",
    );
    let options = EvaluationOptions::new(dir.path().join("data"), dir.path().join("work"));
    let runner = runner_for(&gates);
    let ledger = FileLedgerStore::new(dir.path().join("data").join("whitelists"));
    let outputs = FileGateOutputStore::new(dir.path().join("data").join("gate_output"));
    let global = GlobalWhitelist::new();
    let cancel = CancellationToken::new();
    let ctx = EvaluationContext {
        options: &options,
        runner: &runner,
        ledger: &ledger,
        outputs: &outputs,
        log: &NoopLogSink,
        global_whitelist: &global,
        cancel: &cancel,
    };
    let policy = Policy {
        id: PolicyId::new("default"),
        name: "default".to_string(),
        version: "1".to_string(),
        rules: vec![PolicyRule {
            gate: GateName::new("PKGCHECK"),
            trigger: TriggerName::new("PKGBLACKLIST"),
            action: Action::Warn,
            params: Vec::new(),
        }],
    };
    let image_id = ImageId::new("img-1");

    let evaluation = evaluate_image_policy(&ctx, &policy, &image_id).unwrap();
    assert_eq!(evaluation.verdict, Verdict::Warn);
    assert_eq!(evaluation.ledger_entries_added, 1);
    assert!(dir.path().join("data/gate_output/img-1/PKGCHECK.out").is_file());
    let persisted = ledger.load(&image_id).unwrap();
    assert_eq!(persisted.enforce.len(), 1);
    assert_eq!(persisted.enforce[0].trigger_id.as_ref().unwrap().as_str(), "openssl-1");

    let again = evaluate_image_policy(&ctx, &policy, &image_id).unwrap();
    assert_eq!(again.ledger_entries_added, 0);
    assert!(fs::read_dir(dir.path().join("work")).unwrap().next().is_none());

    fs::remove_file(gates.join("pkgcheck")).unwrap();
    let err = evaluate_image_policy(&ctx, &policy, &image_id).unwrap_err();
    assert!(matches!(err, EvaluationError::GateExecutionFailed(GateError::UnknownGate(_))));
}
