// crates/image-gate-core/src/core/mod.rs
// ============================================================================
// Module: Image Gate Core Types
// Description: Data model shared by every evaluation component.
// Purpose: Group identifiers, bundle model, occurrences, ledgers, and hashing.
// Dependencies: serde, serde_jcs, sha2, thiserror
// ============================================================================

//! ## Overview
//! Core types are pure data: they carry no I/O and no process state, so the
//! runtime components can pass them by reference without hidden coupling.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bundle;
pub mod hashing;
pub mod identifiers;
pub mod image;
pub mod ledger;
pub mod occurrence;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bundle::Action;
pub use bundle::Bundle;
pub use bundle::BundleError;
pub use bundle::ImageSelector;
pub use bundle::ImageSelectorKind;
pub use bundle::MappingRule;
pub use bundle::Policy;
pub use bundle::PolicyRule;
pub use bundle::RuleParam;
pub use bundle::Whitelist;
pub use bundle::WhitelistItem;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::BundleId;
pub use identifiers::GATE_NAME_PATTERN;
pub use identifiers::GateName;
pub use identifiers::ImageId;
pub use identifiers::MappingId;
pub use identifiers::PolicyId;
pub use identifiers::TriggerId;
pub use identifiers::TriggerName;
pub use identifiers::WhitelistId;
pub use image::ImageIdentity;
pub use image::ImageRecord;
pub use image::ImageReference;
pub use image::ReferenceError;
pub use ledger::ImageLedger;
pub use ledger::LedgerEntry;
pub use ledger::LedgerError;
pub use occurrence::FINAL_RECORD_NAME;
pub use occurrence::SuppressedOccurrence;
pub use occurrence::TriggerOccurrence;
pub use occurrence::TriggerPayload;
pub use occurrence::Verdict;
pub use occurrence::WhitelistSource;
