// crates/image-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Image Gate Interfaces
// Description: Contract surfaces for gates, ledgers, output stores, and logs.
// Purpose: Keep the evaluation pipeline independent of process and disk details.
// Dependencies: crate::core, crate::runtime::cancel, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the engine reaches external collaborators: gate
//! executables, the image-local ledger, the raw gate output store, analyzer
//! image metadata, and the evaluation log. Implementations must fail closed:
//! an error is reported, never replaced with an empty success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use thiserror::Error;

use crate::core::GATE_NAME_PATTERN;
use crate::core::GateName;
use crate::core::ImageId;
use crate::core::ImageLedger;
use crate::core::ImageRecord;
use crate::core::LedgerEntry;
use crate::core::LedgerError;
use crate::core::Verdict;
use crate::runtime::cancel::CancellationToken;

// ============================================================================
// SECTION: Gate Runner
// ============================================================================

/// One gate invocation: the gate plus its accumulated parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateInvocation {
    /// Gate to invoke.
    pub gate: GateName,
    /// Parameters in `name=value` form (or the evaluate-all default).
    pub params: Vec<String>,
}

/// Per-run context handed to a gate runner.
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    /// Image under evaluation.
    pub image_id: &'a ImageId,
    /// File listing the image id(s) the gate should inspect.
    pub image_list_file: &'a Path,
    /// Shared analyzer data store.
    pub data_store_dir: &'a Path,
    /// Per-run output directory.
    pub output_dir: &'a Path,
    /// Maximum wall-clock time for the gate.
    pub timeout: Duration,
    /// Cancellation signal for the evaluation.
    pub cancel: &'a CancellationToken,
}

/// Raw output collected from one gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGateOutput {
    /// Gate that produced the output.
    pub gate: GateName,
    /// Newline-delimited `<trigger> <payload>` records.
    pub bytes: Vec<u8>,
    /// Captured stdout/stderr, kept for diagnostics only.
    pub diagnostics: String,
}

/// Gate execution errors.
#[derive(Debug, Error)]
pub enum GateError {
    /// No executable is known for the gate.
    #[error("no executable configured for gate {0}")]
    UnknownGate(GateName),
    /// The gate name cannot be used as a file name.
    #[error("gate name `{0}` must match {pattern}", pattern = GATE_NAME_PATTERN)]
    InvalidName(GateName),
    /// The gate process could not be started.
    #[error("gate {gate} failed to start: {error}")]
    Spawn {
        /// Gate name.
        gate: GateName,
        /// Spawn error text.
        error: String,
    },
    /// The gate exited unsuccessfully.
    #[error("gate {gate} exited with status {}: {diagnostics}", exit_label(.code.as_ref()))]
    ExitStatus {
        /// Gate name.
        gate: GateName,
        /// Exit code, absent when terminated by a signal.
        code: Option<i32>,
        /// Captured diagnostics.
        diagnostics: String,
    },
    /// The gate exited successfully but wrote no output file.
    #[error("gate {gate} did not write output file {}", .path.display())]
    MissingOutput {
        /// Gate name.
        gate: GateName,
        /// Expected output path.
        path: PathBuf,
    },
    /// The gate output exceeds the configured size limit.
    #[error("gate {gate} output is {size} bytes (limit {limit})")]
    OutputTooLarge {
        /// Gate name.
        gate: GateName,
        /// Observed size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The gate did not finish within its timeout and was killed.
    #[error("gate {gate} timed out after {timeout_ms} ms")]
    TimedOut {
        /// Gate name.
        gate: GateName,
        /// Timeout in milliseconds.
        timeout_ms: u128,
    },
    /// The evaluation was cancelled while the gate ran.
    #[error("gate {0} cancelled")]
    Cancelled(GateName),
    /// Stored output was requested but none exists.
    #[error("no stored output for gate {0}")]
    NotStored(GateName),
    /// Workspace or output I/O failed.
    #[error("gate io error: {0}")]
    Io(String),
}

/// Renders an exit code, or `signal` when the process was killed.
fn exit_label(code: Option<&i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

/// Executes a single gate.
pub trait GateRunner {
    /// Invokes the gate once and returns its raw output.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] when the gate fails, times out, or is cancelled.
    fn run(
        &self,
        invocation: &GateInvocation,
        request: &GateRequest<'_>,
    ) -> Result<RawGateOutput, GateError>;
}

// ============================================================================
// SECTION: Gate Output Store
// ============================================================================

/// Raw gate output store errors.
#[derive(Debug, Error)]
pub enum OutputStoreError {
    /// Store I/O failed.
    #[error("gate output store io error: {0}")]
    Io(String),
    /// Key cannot be mapped to storage safely.
    #[error("gate output store invalid key: {0}")]
    InvalidKey(String),
}

/// Persists raw gate output so results can be re-displayed without re-running gates.
pub trait GateOutputStore {
    /// Saves the latest output for an image's gate.
    ///
    /// # Errors
    ///
    /// Returns [`OutputStoreError`] when writing fails.
    fn save(&self, image_id: &ImageId, output: &RawGateOutput) -> Result<(), OutputStoreError>;

    /// Loads the latest stored output for an image's gate.
    ///
    /// # Errors
    ///
    /// Returns [`OutputStoreError`] when reading fails.
    fn load(
        &self,
        image_id: &ImageId,
        gate: &GateName,
    ) -> Result<Option<RawGateOutput>, OutputStoreError>;
}

// ============================================================================
// SECTION: Ledger Store
// ============================================================================

/// Persistent home of image-local whitelist ledgers.
pub trait LedgerStore {
    /// Loads the ledger for an image; a missing ledger is empty.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the ledger is unreadable or corrupt.
    fn load(&self, image_id: &ImageId) -> Result<ImageLedger, LedgerError>;

    /// Appends entries to the image's `enforce` partition, merging with
    /// whatever is currently persisted.
    ///
    /// Returns the number of entries actually appended.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the ledger cannot be updated.
    fn record_enforced(
        &self,
        image_id: &ImageId,
        entries: &[LedgerEntry],
    ) -> Result<usize, LedgerError>;
}

// ============================================================================
// SECTION: Image Metadata
// ============================================================================

/// Image metadata lookup errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The image has not been analyzed.
    #[error("image {0} has not been analyzed")]
    NotFound(ImageId),
    /// Metadata could not be read or decoded.
    #[error("image metadata error: {0}")]
    Invalid(String),
}

/// Source of analyzer metadata for images.
pub trait ImageMetadataSource {
    /// Returns the analyzer record for an image.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when the image is unknown or unreadable.
    fn image(&self, image_id: &ImageId) -> Result<ImageRecord, MetadataError>;
}

// ============================================================================
// SECTION: Evaluation Log
// ============================================================================

/// Structured evaluation log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationLogEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Image under evaluation.
    pub image_id: String,
    /// Requested tag, when the event belongs to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Gate name, for gate events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
    /// Policy identifier, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    /// Mapping rule identifier, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<String>,
    /// Verdict, for finished evaluations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    /// Event-specific count (entries appended, occurrences, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Free-form detail (error text, skipped line, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl EvaluationLogEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event: &'static str, image_id: &ImageId) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis());
        Self {
            event,
            timestamp_ms,
            image_id: image_id.to_string(),
            tag: None,
            gate: None,
            policy_id: None,
            mapping_id: None,
            verdict: None,
            count: None,
            detail: None,
        }
    }

    /// Sets the tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Sets the gate.
    #[must_use]
    pub fn with_gate(mut self, gate: &GateName) -> Self {
        self.gate = Some(gate.to_string());
        self
    }

    /// Sets the policy identifier.
    #[must_use]
    pub fn with_policy(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }

    /// Sets the mapping identifier.
    #[must_use]
    pub fn with_mapping(mut self, mapping_id: impl Into<String>) -> Self {
        self.mapping_id = Some(mapping_id.into());
        self
    }

    /// Sets the verdict.
    #[must_use]
    pub const fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    /// Sets the count.
    #[must_use]
    pub const fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets the detail text.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Destination for structured evaluation events.
pub trait EvaluationLogSink: Send + Sync {
    /// Records an event. Sinks never fail the evaluation.
    fn record(&self, event: &EvaluationLogEvent);
}
