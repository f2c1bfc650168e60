// crates/image-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Image Gate Runtime
// Description: Evaluation pipeline components and the engine that drives them.
// Purpose: Resolve, execute, normalize, filter, aggregate, and cache evaluations.
// Dependencies: crate::{core, interfaces}, fs2, regex, tempfile
// ============================================================================

//! ## Overview
//! Runtime modules implement the evaluation pipeline leaf-first: pattern
//! matching, mapping resolution, gate execution, trigger normalization,
//! whitelist filtering, aggregation, and the per-run cache. The engine wires
//! them together through an explicit [`EvaluationContext`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod aggregate;
pub mod cache;
pub mod cancel;
pub mod engine;
pub mod gate;
pub mod log;
pub mod mapping;
pub mod normalize;
pub mod pattern;
pub mod store;
pub mod whitelist;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use aggregate::aggregate;
pub use cache::CacheKey;
pub use cache::EvaluationCache;
pub use cancel::CancellationToken;
pub use engine::BundleRun;
pub use engine::EvaluationContext;
pub use engine::EvaluationError;
pub use engine::EvaluationOptions;
pub use engine::EvaluationWarning;
pub use engine::GateSource;
pub use engine::PolicyEvaluation;
pub use engine::TagEvaluation;
pub use engine::TagVerdict;
pub use engine::evaluate_image_policy;
pub use engine::evaluate_policy;
pub use engine::run_bundle;
pub use gate::DEFAULT_GATE_PARAM;
pub use gate::GateExecutables;
pub use gate::ProcessGateRunner;
pub use gate::plan_gate_invocations;
pub use log::FileLogSink;
pub use log::NoopLogSink;
pub use log::RecordingLogSink;
pub use log::StderrLogSink;
pub use mapping::MappingError;
pub use mapping::Resolution;
pub use mapping::resolve;
pub use normalize::normalize;
pub use normalize::normalize_output;
pub use pattern::GlobPattern;
pub use pattern::PatternError;
pub use store::FileGateOutputStore;
pub use store::FileLedgerStore;
pub use store::InMemoryGateOutputStore;
pub use store::InMemoryImageMetadata;
pub use store::InMemoryLedgerStore;
pub use whitelist::FilterOutcome;
pub use whitelist::GlobalWhitelist;
pub use whitelist::GlobalWhitelistEntry;
pub use whitelist::WhitelistCompat;
pub use whitelist::WhitelistFilter;
pub use whitelist::filter_occurrences;
