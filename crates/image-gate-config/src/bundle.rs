// crates/image-gate-config/src/bundle.rs
// ============================================================================
// Module: Bundle Loading
// Description: Size-limited, schema-validated bundle decoding.
// Purpose: Reject invalid bundles wholesale before any evaluation starts.
// Dependencies: image-gate-core, jsonschema, serde_json
// ============================================================================

//! ## Overview
//! Loading runs four fail-closed stages in order: size limit, JSON parse,
//! JSON Schema validation, then decoding into [`Bundle`] and semantic
//! validation. Schema and semantic problems are reported in full, not just
//! the first one found.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use image_gate_core::Bundle;
use image_gate_core::BundleError;
use jsonschema::Draft;
use serde_json::Value;

use crate::schema::bundle_schema;

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Reads and validates a bundle file.
///
/// # Errors
///
/// Returns [`BundleError`] when the file is too large, unreadable, or invalid.
pub fn load_bundle(path: &Path, max_bytes: usize) -> Result<Bundle, BundleError> {
    let metadata = fs::metadata(path)
        .map_err(|err| BundleError::Io(format!("{}: {err}", path.display())))?;
    let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    if size > max_bytes {
        return Err(BundleError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let bytes =
        fs::read(path).map_err(|err| BundleError::Io(format!("{}: {err}", path.display())))?;
    parse_bundle(&bytes, max_bytes)
}

/// Parses and validates bundle bytes.
///
/// # Errors
///
/// Returns [`BundleError`] when the bytes are too large or do not form a valid bundle.
pub fn parse_bundle(bytes: &[u8], max_bytes: usize) -> Result<Bundle, BundleError> {
    if bytes.len() > max_bytes {
        return Err(BundleError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| BundleError::Parse(err.to_string()))?;
    validate_bundle_schema(&value)?;
    let bundle: Bundle =
        serde_json::from_value(value).map_err(|err| BundleError::Parse(err.to_string()))?;
    bundle.validate()?;
    Ok(bundle)
}

/// Validates a JSON value against the bundle schema.
///
/// # Errors
///
/// Returns [`BundleError::Schema`] listing every schema violation.
pub fn validate_bundle_schema(value: &Value) -> Result<(), BundleError> {
    let schema = bundle_schema();
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| BundleError::Schema(vec![format!("schema compile failed: {err}")]))?;
    let problems: Vec<String> = validator.iter_errors(value).map(|err| err.to_string()).collect();
    if problems.is_empty() { Ok(()) } else { Err(BundleError::Schema(problems)) }
}
