// crates/image-gate-core/src/runtime/gate.rs
// ============================================================================
// Module: Image Gate Execution Adapter
// Description: Plans, runs, and collects external gate processes.
// Purpose: Invoke each policy gate exactly once with its accumulated params.
// Dependencies: crate::{core, interfaces, runtime}, tempfile
// ============================================================================

//! ## Overview
//! [`plan_gate_invocations`] walks a policy's rules once and produces one
//! invocation per distinct gate, in first-use order. [`execute_policy_gates`]
//! runs the plan sequentially and stops at the first failure; no partial
//! result is returned. [`ProcessGateRunner`] implements the process
//! contract:
//!
//! ```text
//! <gate-executable> <image-list-file> <data-store-dir> <output-dir> [param ...]
//! ```
//!
//! The gate must exit 0 and write `<output-dir>/<GATE>`. Stdout and stderr
//! are redirected to files and kept for diagnostics only. The runner polls the
//! child so that timeouts and cancellation kill the process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use tempfile::TempDir;

use crate::core::GateName;
use crate::core::ImageId;
use crate::core::Policy;
use crate::interfaces::EvaluationLogEvent;
use crate::interfaces::EvaluationLogSink;
use crate::interfaces::GateError;
use crate::interfaces::GateInvocation;
use crate::interfaces::GateOutputStore;
use crate::interfaces::GateRequest;
use crate::interfaces::GateRunner;
use crate::interfaces::RawGateOutput;
use crate::runtime::cancel::CancellationToken;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Parameter passed when no rule for a gate declares params.
pub const DEFAULT_GATE_PARAM: &str = "all";

/// Default maximum size of a gate output file.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Interval between child status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Maximum diagnostic bytes kept per stream.
const MAX_DIAGNOSTIC_BYTES: u64 = 8 * 1024;

// ============================================================================
// SECTION: Planning
// ============================================================================

/// Builds one invocation per distinct gate referenced by the policy.
#[must_use]
pub fn plan_gate_invocations(policy: &Policy) -> Vec<GateInvocation> {
    policy
        .gate_names()
        .into_iter()
        .map(|gate| {
            let mut params: Vec<String> = policy
                .rules
                .iter()
                .filter(|rule| rule.gate == gate)
                .flat_map(|rule| rule.params.iter().map(|param| param.to_argument()))
                .collect();
            if params.is_empty() {
                params.push(DEFAULT_GATE_PARAM.to_string());
            }
            GateInvocation {
                gate,
                params,
            }
        })
        .collect()
}

// ============================================================================
// SECTION: Workspace
// ============================================================================

/// Per-run scratch directory holding the image list and gate outputs.
///
/// The directory is removed when the workspace is dropped.
#[derive(Debug)]
pub struct GateWorkspace {
    /// Temporary run directory.
    root: TempDir,
    /// File listing the image id.
    image_list_file: PathBuf,
    /// Directory gates write their output into.
    output_dir: PathBuf,
}

impl GateWorkspace {
    /// Creates a run directory under `workspace_dir` for an image.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Io`] when the directory or image list cannot be written.
    pub fn create(workspace_dir: &Path, image_id: &ImageId) -> Result<Self, GateError> {
        fs::create_dir_all(workspace_dir).map_err(|err| GateError::Io(err.to_string()))?;
        let root = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(workspace_dir)
            .map_err(|err| GateError::Io(err.to_string()))?;
        let image_list_file = root.path().join("image_list");
        fs::write(&image_list_file, format!("{image_id}\n"))
            .map_err(|err| GateError::Io(err.to_string()))?;
        let output_dir = root.path().join("output");
        fs::create_dir(&output_dir).map_err(|err| GateError::Io(err.to_string()))?;
        Ok(Self {
            root,
            image_list_file,
            output_dir,
        })
    }

    /// Returns the run directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Returns the image list file.
    #[must_use]
    pub fn image_list_file(&self) -> &Path {
        &self.image_list_file
    }

    /// Returns the gate output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Settings shared by every gate of one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct GateRunSettings<'a> {
    /// Shared analyzer data store.
    pub data_store_dir: &'a Path,
    /// Per-gate timeout.
    pub timeout: Duration,
    /// Cancellation signal.
    pub cancel: &'a CancellationToken,
}

/// Runs every gate the policy references, sequentially and fail-fast.
///
/// Each successful output is persisted to `store` before the next gate runs.
///
/// # Errors
///
/// Returns the first [`GateError`]; remaining gates are not run.
pub fn execute_policy_gates(
    runner: &dyn GateRunner,
    store: &dyn GateOutputStore,
    policy: &Policy,
    image_id: &ImageId,
    workspace: &GateWorkspace,
    settings: &GateRunSettings<'_>,
    log: &dyn EvaluationLogSink,
) -> Result<Vec<RawGateOutput>, GateError> {
    let request = GateRequest {
        image_id,
        image_list_file: workspace.image_list_file(),
        data_store_dir: settings.data_store_dir,
        output_dir: workspace.output_dir(),
        timeout: settings.timeout,
        cancel: settings.cancel,
    };
    let mut outputs = Vec::new();
    for invocation in plan_gate_invocations(policy) {
        if settings.cancel.is_cancelled() {
            return Err(GateError::Cancelled(invocation.gate));
        }
        log.record(
            &EvaluationLogEvent::new("gate_started", image_id)
                .with_gate(&invocation.gate)
                .with_policy(policy.id.as_str())
                .with_detail(invocation.params.join(" ")),
        );
        let output = match runner.run(&invocation, &request) {
            Ok(output) => output,
            Err(err) => {
                log.record(
                    &EvaluationLogEvent::new("gate_failed", image_id)
                        .with_gate(&invocation.gate)
                        .with_policy(policy.id.as_str())
                        .with_detail(err.to_string()),
                );
                return Err(err);
            }
        };
        store.save(image_id, &output).map_err(|err| GateError::Io(err.to_string()))?;
        log.record(
            &EvaluationLogEvent::new("gate_finished", image_id)
                .with_gate(&invocation.gate)
                .with_policy(policy.id.as_str())
                .with_count(output.bytes.len()),
        );
        outputs.push(output);
    }
    Ok(outputs)
}

/// Loads previously stored output for every gate the policy references.
///
/// # Errors
///
/// Returns [`GateError::NotStored`] for the first gate without stored output.
pub fn load_stored_gate_outputs(
    store: &dyn GateOutputStore,
    policy: &Policy,
    image_id: &ImageId,
) -> Result<Vec<RawGateOutput>, GateError> {
    policy
        .gate_names()
        .into_iter()
        .map(|gate| match store.load(image_id, &gate) {
            Ok(Some(output)) => Ok(output),
            Ok(None) => Err(GateError::NotStored(gate)),
            Err(err) => Err(GateError::Io(err.to_string())),
        })
        .collect()
}

// ============================================================================
// SECTION: Executable Resolution
// ============================================================================

/// Maps gate names to executables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateExecutables {
    /// Directory searched for `<gate name lowercased>`.
    gates_dir: Option<PathBuf>,
    /// Explicit per-gate executables.
    overrides: BTreeMap<GateName, PathBuf>,
}

impl GateExecutables {
    /// Creates a resolver searching `gates_dir`.
    #[must_use]
    pub fn new(gates_dir: impl Into<PathBuf>) -> Self {
        Self {
            gates_dir: Some(gates_dir.into()),
            overrides: BTreeMap::new(),
        }
    }

    /// Registers an explicit executable for a gate.
    #[must_use]
    pub fn with_executable(mut self, gate: GateName, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(gate, path.into());
        self
    }

    /// Resolves the executable for a gate.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidName`] for names that are not a single safe
    /// file name and [`GateError::UnknownGate`] when no executable file exists.
    pub fn resolve(&self, gate: &GateName) -> Result<PathBuf, GateError> {
        if !gate.is_valid() {
            return Err(GateError::InvalidName(gate.clone()));
        }
        let candidate = match self.overrides.get(gate) {
            Some(path) => path.clone(),
            None => match &self.gates_dir {
                Some(dir) => dir.join(gate.as_str().to_ascii_lowercase()),
                None => return Err(GateError::UnknownGate(gate.clone())),
            },
        };
        if candidate.is_file() { Ok(candidate) } else { Err(GateError::UnknownGate(gate.clone())) }
    }
}

// ============================================================================
// SECTION: Process Runner
// ============================================================================

/// Gate runner that spawns gate executables.
#[derive(Debug, Clone)]
pub struct ProcessGateRunner {
    /// Executable resolver.
    executables: GateExecutables,
    /// Maximum accepted output file size.
    max_output_bytes: usize,
}

impl ProcessGateRunner {
    /// Creates a process runner.
    #[must_use]
    pub const fn new(executables: GateExecutables, max_output_bytes: usize) -> Self {
        Self {
            executables,
            max_output_bytes,
        }
    }
}

impl GateRunner for ProcessGateRunner {
    fn run(
        &self,
        invocation: &GateInvocation,
        request: &GateRequest<'_>,
    ) -> Result<RawGateOutput, GateError> {
        let gate = &invocation.gate;
        let executable = self.executables.resolve(gate)?;
        let stdout_path = request.output_dir.join(format!("{gate}.stdout"));
        let stderr_path = request.output_dir.join(format!("{gate}.stderr"));
        let stdout = File::create(&stdout_path).map_err(|err| GateError::Io(err.to_string()))?;
        let stderr = File::create(&stderr_path).map_err(|err| GateError::Io(err.to_string()))?;

        let mut child = Command::new(&executable)
            .arg(request.image_list_file)
            .arg(request.data_store_dir)
            .arg(request.output_dir)
            .args(&invocation.params)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|err| GateError::Spawn {
                gate: gate.clone(),
                error: err.to_string(),
            })?;

        let deadline = Instant::now() + request.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(err) => {
                    terminate(&mut child);
                    return Err(GateError::Io(err.to_string()));
                }
            }
            if request.cancel.is_cancelled() {
                terminate(&mut child);
                return Err(GateError::Cancelled(gate.clone()));
            }
            if Instant::now() >= deadline {
                terminate(&mut child);
                return Err(GateError::TimedOut {
                    gate: gate.clone(),
                    timeout_ms: request.timeout.as_millis(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let diagnostics = collect_diagnostics(&stdout_path, &stderr_path);
        if !status.success() {
            return Err(GateError::ExitStatus {
                gate: gate.clone(),
                code: status.code(),
                diagnostics,
            });
        }

        let output_path = request.output_dir.join(gate.as_str());
        let metadata = match fs::metadata(&output_path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                return Err(GateError::MissingOutput {
                    gate: gate.clone(),
                    path: output_path,
                });
            }
        };
        let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if size > self.max_output_bytes {
            return Err(GateError::OutputTooLarge {
                gate: gate.clone(),
                size,
                limit: self.max_output_bytes,
            });
        }
        let bytes = fs::read(&output_path).map_err(|err| GateError::Io(err.to_string()))?;
        Ok(RawGateOutput {
            gate: gate.clone(),
            bytes,
            diagnostics,
        })
    }
}

/// Kills and reaps a child process.
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Reads the bounded head of the captured stdout and stderr files.
fn collect_diagnostics(stdout_path: &Path, stderr_path: &Path) -> String {
    let mut out = String::new();
    for path in [stdout_path, stderr_path] {
        let Ok(file) = File::open(path) else {
            continue;
        };
        let mut buffer = Vec::new();
        if file.take(MAX_DIAGNOSTIC_BYTES).read_to_end(&mut buffer).is_err() {
            continue;
        }
        let text = String::from_utf8_lossy(&buffer);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(text);
    }
    out
}
