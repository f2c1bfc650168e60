// crates/image-gate-core/src/runtime/engine.rs
// ============================================================================
// Module: Image Gate Evaluation Engine
// Description: End-to-end evaluation of policies and bundles for one image.
// Purpose: Drive mapping, gates, normalization, filtering, and aggregation.
// Dependencies: crate::{core, interfaces, runtime}, serde, thiserror
// ============================================================================

//! ## Overview
//! [`evaluate_policy`] runs one policy against one image:
//!
//! 1. run the policy's gates (or load their stored output);
//! 2. normalize the raw output against the policy;
//! 3. load the image ledger (a load failure becomes a warning and an empty
//!    ledger, and the ledger is left untouched);
//! 4. filter occurrences through the ledger and global whitelist;
//! 5. record untracked active occurrences in the ledger `enforce` partition;
//! 6. aggregate the verdict and append the `FINAL` record.
//!
//! [`run_bundle`] resolves every requested tag through the bundle's mapping
//! rules and evaluates each distinct (policy, whitelist set) pair once per
//! image run. Every fatal problem for a tag is reported as that tag's error;
//! no verdict is produced for it.
//!
//! All collaborators arrive through [`EvaluationContext`]; the engine holds no
//! process-wide state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::core::Bundle;
use crate::core::BundleError;
use crate::core::GateName;
use crate::core::HashError;
use crate::core::ImageId;
use crate::core::ImageLedger;
use crate::core::ImageRecord;
use crate::core::LedgerError;
use crate::core::MappingId;
use crate::core::Policy;
use crate::core::PolicyId;
use crate::core::ReferenceError;
use crate::core::SuppressedOccurrence;
use crate::core::TriggerOccurrence;
use crate::core::Verdict;
use crate::core::WhitelistId;
use crate::interfaces::EvaluationLogEvent;
use crate::interfaces::EvaluationLogSink;
use crate::interfaces::GateError;
use crate::interfaces::GateOutputStore;
use crate::interfaces::GateRunner;
use crate::interfaces::LedgerStore;
use crate::runtime::aggregate::finalize;
use crate::runtime::cache::CacheKey;
use crate::runtime::cache::EvaluationCache;
use crate::runtime::cancel::CancellationToken;
use crate::runtime::gate::GateRunSettings;
use crate::runtime::gate::GateWorkspace;
use crate::runtime::gate::execute_policy_gates;
use crate::runtime::gate::load_stored_gate_outputs;
use crate::runtime::mapping::MappingError;
use crate::runtime::mapping::resolve;
use crate::runtime::normalize::normalize_output;
use crate::runtime::pattern::PatternError;
use crate::runtime::whitelist::GlobalWhitelist;
use crate::runtime::whitelist::WhitelistCompat;
use crate::runtime::whitelist::WhitelistFilter;
use crate::runtime::whitelist::pending_ledger_entries;

// ============================================================================
// SECTION: Options and Context
// ============================================================================

/// Default per-gate timeout.
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(300);

/// Where raw gate output comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSource {
    /// Run the gate executables.
    Execute,
    /// Replay previously stored output without running gates.
    Stored,
}

/// Evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationOptions {
    /// Shared analyzer data store handed to gates.
    pub data_store_dir: PathBuf,
    /// Parent of per-run gate workspaces.
    pub workspace_dir: PathBuf,
    /// Per-gate timeout.
    pub gate_timeout: Duration,
    /// Whitelist compatibility switches.
    pub compat: WhitelistCompat,
    /// Gate output source.
    pub gate_source: GateSource,
}

impl EvaluationOptions {
    /// Creates options with default timeout and compatibility settings.
    #[must_use]
    pub fn new(data_store_dir: impl Into<PathBuf>, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_store_dir: data_store_dir.into(),
            workspace_dir: workspace_dir.into(),
            gate_timeout: DEFAULT_GATE_TIMEOUT,
            compat: WhitelistCompat::default(),
            gate_source: GateSource::Execute,
        }
    }
}

/// Explicit evaluation context passed into every engine entry point.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Evaluation settings.
    pub options: &'a EvaluationOptions,
    /// Gate runner.
    pub runner: &'a dyn GateRunner,
    /// Image ledger store.
    pub ledger: &'a dyn LedgerStore,
    /// Raw gate output store.
    pub outputs: &'a dyn GateOutputStore,
    /// Evaluation log.
    pub log: &'a dyn EvaluationLogSink,
    /// Global whitelist entries applied to every evaluation.
    pub global_whitelist: &'a GlobalWhitelist,
    /// Cancellation signal.
    pub cancel: &'a CancellationToken,
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Non-fatal condition observed during an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationWarning {
    /// A gate output line was skipped.
    MalformedGateOutput {
        /// Gate that produced the line.
        gate: GateName,
        /// 1-based line number.
        line: usize,
        /// Skip reason.
        reason: String,
    },
    /// The image ledger could not be loaded and was treated as empty.
    WhitelistLoadFailed {
        /// Load error text.
        error: String,
    },
}

/// Result of evaluating one policy against one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyEvaluation {
    /// Image evaluated.
    pub image_id: ImageId,
    /// Policy applied.
    pub policy_id: PolicyId,
    /// Bundle whitelists applied (empty for the legacy path).
    pub whitelist_ids: Vec<WhitelistId>,
    /// Aggregated verdict.
    pub verdict: Verdict,
    /// Active occurrences followed by the `FINAL` record.
    pub records: Vec<TriggerOccurrence>,
    /// Occurrences suppressed by a whitelist.
    pub suppressed: Vec<SuppressedOccurrence>,
    /// Non-fatal conditions.
    pub warnings: Vec<EvaluationWarning>,
    /// Entries appended to the ledger `enforce` partition.
    pub ledger_entries_added: usize,
    /// Gates executed (zero when replaying stored output).
    pub gates_run: usize,
}

impl PolicyEvaluation {
    /// Returns the active occurrences without the `FINAL` record.
    #[must_use]
    pub fn active(&self) -> &[TriggerOccurrence] {
        match self.records.split_last() {
            Some((last, rest)) if last.is_final_record() => rest,
            _ => &self.records,
        }
    }
}

/// Successful evaluation of one requested tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagVerdict {
    /// Matched mapping rule.
    pub mapping_id: MappingId,
    /// Matched mapping rule name.
    pub mapping_name: String,
    /// Position of the matched rule.
    pub mapping_index: usize,
    /// Evaluation was served from the cache.
    pub cache_hit: bool,
    /// Evaluation result.
    pub evaluation: PolicyEvaluation,
}

/// Outcome for one requested tag.
#[derive(Debug)]
pub struct TagEvaluation {
    /// Requested tag reference.
    pub tag: String,
    /// Verdict, or the error that prevented one.
    pub outcome: Result<TagVerdict, EvaluationError>,
}

/// Outcome of a bundle run for one image.
#[derive(Debug)]
pub struct BundleRun {
    /// Image evaluated.
    pub image_id: ImageId,
    /// Per-tag outcomes, in request order.
    pub tags: Vec<TagEvaluation>,
    /// Gate executions performed across all tags.
    pub gate_executions: usize,
}

impl BundleRun {
    /// Returns true when any tag failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.tags.iter().any(|tag| tag.outcome.is_err())
    }

    /// Returns the most severe verdict across successful tags.
    #[must_use]
    pub fn worst_verdict(&self) -> Option<Verdict> {
        self.tags
            .iter()
            .filter_map(|tag| tag.outcome.as_ref().ok())
            .map(|verdict| verdict.evaluation.verdict)
            .max()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal evaluation errors.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The bundle failed validation; nothing was evaluated.
    #[error(transparent)]
    BundleInvalid(#[from] BundleError),
    /// No mapping rule applies to the image (or the match could not be evaluated).
    #[error(transparent)]
    MappingNotFound(#[from] MappingError),
    /// A requested tag is not a valid image reference.
    #[error(transparent)]
    InvalidReference(#[from] ReferenceError),
    /// No tags were requested and the image has none recorded.
    #[error("image {0} has no tags to evaluate")]
    NoTags(ImageId),
    /// A gate failed, timed out, or had no usable output.
    #[error(transparent)]
    GateExecutionFailed(GateError),
    /// A whitelist entry could not be compiled.
    #[error("invalid whitelist entry: {0}")]
    WhitelistInvalid(#[from] PatternError),
    /// The evaluation was cancelled.
    #[error("evaluation cancelled")]
    Cancelled,
    /// Cache key derivation failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// The image ledger could not be updated.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<GateError> for EvaluationError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Cancelled(_) => Self::Cancelled,
            other => Self::GateExecutionFailed(other),
        }
    }
}

// ============================================================================
// SECTION: Policy Evaluation
// ============================================================================

/// Evaluates one policy against one image using the context's global whitelist.
///
/// # Errors
///
/// Returns [`EvaluationError`] when gates fail, the evaluation is cancelled,
/// or the ledger cannot be updated.
pub fn evaluate_image_policy(
    ctx: &EvaluationContext<'_>,
    policy: &Policy,
    image_id: &ImageId,
) -> Result<PolicyEvaluation, EvaluationError> {
    evaluate_policy(ctx, policy, image_id, ctx.global_whitelist, &[])
}

/// Evaluates one policy against one image with an explicit whitelist.
///
/// # Errors
///
/// Returns [`EvaluationError`] when gates fail, the evaluation is cancelled,
/// or the ledger cannot be updated.
pub fn evaluate_policy(
    ctx: &EvaluationContext<'_>,
    policy: &Policy,
    image_id: &ImageId,
    whitelist: &GlobalWhitelist,
    whitelist_ids: &[WhitelistId],
) -> Result<PolicyEvaluation, EvaluationError> {
    if ctx.cancel.is_cancelled() {
        return Err(EvaluationError::Cancelled);
    }
    let filter = WhitelistFilter::new(whitelist, ctx.options.compat)?;

    let (outputs, gates_run) = match ctx.options.gate_source {
        GateSource::Execute => {
            let workspace = GateWorkspace::create(&ctx.options.workspace_dir, image_id)?;
            let settings = GateRunSettings {
                data_store_dir: &ctx.options.data_store_dir,
                timeout: ctx.options.gate_timeout,
                cancel: ctx.cancel,
            };
            let outputs = execute_policy_gates(
                ctx.runner,
                ctx.outputs,
                policy,
                image_id,
                &workspace,
                &settings,
                ctx.log,
            )?;
            let gates_run = outputs.len();
            (outputs, gates_run)
        }
        GateSource::Stored => (load_stored_gate_outputs(ctx.outputs, policy, image_id)?, 0),
    };

    let mut warnings = Vec::new();
    let mut occurrences = Vec::new();
    for output in &outputs {
        let normalized = normalize_output(image_id, policy, output);
        for malformed in normalized.malformed {
            ctx.log.record(
                &EvaluationLogEvent::new("malformed_gate_output", image_id)
                    .with_gate(&malformed.gate)
                    .with_count(malformed.line)
                    .with_detail(malformed.reason.clone()),
            );
            warnings.push(EvaluationWarning::MalformedGateOutput {
                gate: malformed.gate,
                line: malformed.line,
                reason: malformed.reason,
            });
        }
        occurrences.extend(normalized.occurrences);
    }

    let (ledger, ledger_loaded) = match ctx.ledger.load(image_id) {
        Ok(ledger) => (ledger, true),
        Err(err) => {
            ctx.log.record(
                &EvaluationLogEvent::new("ledger_load_failed", image_id).with_detail(err.to_string()),
            );
            warnings.push(EvaluationWarning::WhitelistLoadFailed {
                error: err.to_string(),
            });
            (ImageLedger::new(), false)
        }
    };

    let outcome = filter.filter(occurrences, &ledger);

    let mut ledger_entries_added = 0;
    if ledger_loaded && ctx.options.gate_source == GateSource::Execute {
        let pending =
            pending_ledger_entries(&outcome.active, &ledger, ctx.options.compat.legacy_ledger_records);
        ledger_entries_added = ctx.ledger.record_enforced(image_id, &pending)?;
        if ledger_entries_added > 0 {
            ctx.log.record(
                &EvaluationLogEvent::new("ledger_updated", image_id).with_count(ledger_entries_added),
            );
        }
    }

    let (verdict, records) = finalize(image_id, outcome.active);
    ctx.log.record(
        &EvaluationLogEvent::new("evaluation_finished", image_id)
            .with_policy(policy.id.as_str())
            .with_verdict(verdict)
            .with_count(records.len().saturating_sub(1)),
    );

    Ok(PolicyEvaluation {
        image_id: image_id.clone(),
        policy_id: policy.id.clone(),
        whitelist_ids: whitelist_ids.to_vec(),
        verdict,
        records,
        suppressed: outcome.suppressed,
        warnings,
        ledger_entries_added,
        gates_run,
    })
}

// ============================================================================
// SECTION: Bundle Evaluation
// ============================================================================

/// Evaluates a bundle against every requested tag of one image.
///
/// When `tags` is empty the image's recorded tags are evaluated. The bundle
/// is validated first; an invalid bundle is never evaluated.
///
/// # Errors
///
/// Returns [`EvaluationError::BundleInvalid`] for an invalid bundle and
/// [`EvaluationError::NoTags`] when there is nothing to evaluate. Per-tag
/// failures are reported in [`BundleRun::tags`].
pub fn run_bundle(
    ctx: &EvaluationContext<'_>,
    bundle: &Bundle,
    record: &ImageRecord,
    tags: &[String],
    candidate_digests: &[String],
) -> Result<BundleRun, EvaluationError> {
    bundle.validate()?;
    let requested: &[String] = if tags.is_empty() { &record.tags } else { tags };
    if requested.is_empty() {
        return Err(EvaluationError::NoTags(record.image_id.clone()));
    }

    let mut cache = EvaluationCache::new();
    let mut run = BundleRun {
        image_id: record.image_id.clone(),
        tags: Vec::with_capacity(requested.len()),
        gate_executions: 0,
    };
    for tag in requested {
        let outcome = evaluate_tag(ctx, bundle, record, tag, candidate_digests, &mut cache);
        match &outcome {
            Ok(verdict) if !verdict.cache_hit => {
                run.gate_executions += verdict.evaluation.gates_run;
            }
            Err(EvaluationError::Cancelled) => {
                ctx.log.record(
                    &EvaluationLogEvent::new("evaluation_cancelled", &record.image_id).with_tag(tag),
                );
            }
            _ => {}
        }
        run.tags.push(TagEvaluation {
            tag: tag.clone(),
            outcome,
        });
    }
    Ok(run)
}

/// Resolves and evaluates a single requested tag.
fn evaluate_tag(
    ctx: &EvaluationContext<'_>,
    bundle: &Bundle,
    record: &ImageRecord,
    tag: &str,
    candidate_digests: &[String],
    cache: &mut EvaluationCache,
) -> Result<TagVerdict, EvaluationError> {
    if ctx.cancel.is_cancelled() {
        return Err(EvaluationError::Cancelled);
    }
    let image_id = &record.image_id;
    let identity = record.identity_for(tag)?;
    let resolution = match resolve(bundle, &identity, candidate_digests) {
        Ok(resolution) => resolution,
        Err(err) => {
            ctx.log.record(
                &EvaluationLogEvent::new("mapping_not_found", image_id)
                    .with_tag(tag)
                    .with_detail(err.to_string()),
            );
            return Err(err.into());
        }
    };
    let rule = resolution.rule;
    ctx.log.record(
        &EvaluationLogEvent::new("mapping_resolved", image_id)
            .with_tag(tag)
            .with_mapping(rule.id.as_str())
            .with_policy(resolution.policy.id.as_str()),
    );

    let key = CacheKey::new(&rule.policy_id, &rule.whitelist_ids)?;
    if let Some(cached) = cache.get(&key) {
        ctx.log.record(
            &EvaluationLogEvent::new("cache_hit", image_id)
                .with_tag(tag)
                .with_mapping(rule.id.as_str())
                .with_policy(rule.policy_id.as_str())
                .with_verdict(cached.verdict),
        );
        return Ok(TagVerdict {
            mapping_id: rule.id.clone(),
            mapping_name: rule.name.clone(),
            mapping_index: resolution.index,
            cache_hit: true,
            evaluation: cached.clone(),
        });
    }

    let mut whitelist = GlobalWhitelist::new();
    for bundle_whitelist in resolution.whitelists(bundle)? {
        whitelist.extend_from_bundle(bundle_whitelist);
    }
    whitelist.extend(ctx.global_whitelist);

    let evaluation =
        evaluate_policy(ctx, resolution.policy, image_id, &whitelist, &rule.whitelist_ids)?;
    if !ctx.cancel.is_cancelled() {
        cache.insert(key, evaluation.clone());
    }
    Ok(TagVerdict {
        mapping_id: rule.id.clone(),
        mapping_name: rule.name.clone(),
        mapping_index: resolution.index,
        cache_hit: false,
        evaluation,
    })
}
