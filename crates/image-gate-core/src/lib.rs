// crates/image-gate-core/src/lib.rs
// ============================================================================
// Module: Image Gate Core Library
// Description: Public API surface for the Image Gate evaluation engine.
// Purpose: Expose core types, interfaces, and runtime components.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Image Gate core decides whether an analyzed container image may progress
//! (GO), progresses with a warning (WARN), or is stopped (STOP). Policy bundles
//! map images to policies and whitelists; external gates produce findings that
//! are normalized, filtered, and aggregated. Processes, disks, and logs are
//! reached only through the interfaces in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::EvaluationLogEvent;
pub use interfaces::EvaluationLogSink;
pub use interfaces::GateError;
pub use interfaces::GateInvocation;
pub use interfaces::GateOutputStore;
pub use interfaces::GateRequest;
pub use interfaces::GateRunner;
pub use interfaces::ImageMetadataSource;
pub use interfaces::LedgerStore;
pub use interfaces::MetadataError;
pub use interfaces::OutputStoreError;
pub use interfaces::RawGateOutput;
pub use runtime::BundleRun;
pub use runtime::CancellationToken;
pub use runtime::EvaluationContext;
pub use runtime::EvaluationError;
pub use runtime::EvaluationOptions;
pub use runtime::EvaluationWarning;
pub use runtime::GateSource;
pub use runtime::GlobalWhitelist;
pub use runtime::GlobalWhitelistEntry;
pub use runtime::PolicyEvaluation;
pub use runtime::TagEvaluation;
pub use runtime::TagVerdict;
pub use runtime::WhitelistCompat;
