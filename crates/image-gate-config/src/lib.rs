// crates/image-gate-config/src/lib.rs
// ============================================================================
// Module: Image Gate Config Library
// Description: Runtime configuration, bundle loading, and legacy formats.
// Purpose: Single source of truth for image-gate.toml and on-disk inputs.
// Dependencies: image-gate-core, jsonschema, serde, toml
// ============================================================================

//! ## Overview
//! `image-gate-config` owns everything read from disk before an evaluation
//! starts: the `image-gate.toml` runtime configuration, policy bundles
//! (schema-validated before decoding), the legacy flat policy and global
//! whitelist formats, and analyzer image metadata.
//!
//! All loaders fail closed: an input that does not validate is rejected as a
//! whole and never partially applied.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bundle;
pub mod config;
pub mod legacy;
pub mod metadata;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bundle::load_bundle;
pub use bundle::parse_bundle;
pub use bundle::validate_bundle_schema;
pub use config::*;
pub use legacy::LegacyParseError;
pub use legacy::load_global_whitelist;
pub use legacy::load_legacy_policy;
pub use legacy::parse_global_whitelist;
pub use legacy::parse_legacy_policy;
pub use metadata::FileImageMetadataSource;
pub use schema::bundle_schema;
