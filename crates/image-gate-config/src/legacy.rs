// crates/image-gate-config/src/legacy.rs
// ============================================================================
// Module: Legacy File Formats
// Description: Parsers for the flat policy and global whitelist files.
// Purpose: Keep single-policy evaluation and global suppression working.
// Dependencies: image-gate-core, thiserror
// ============================================================================

//! ## Overview
//! Two line-oriented formats predate bundles:
//!
//! - flat policy: `GATE:TRIGGER:ACTION[:name=a,b other=c]`
//! - global whitelist: `<gate> <trigger_id-or-glob>`
//!
//! In both, blank lines and `#` comments are skipped and gate names are
//! normalized to upper case. A malformed line or a gate name outside
//! `[A-Za-z0-9_-]` rejects the whole file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use image_gate_core::Action;
use image_gate_core::BundleError;
use image_gate_core::GATE_NAME_PATTERN;
use image_gate_core::GateName;
use image_gate_core::GlobalWhitelist;
use image_gate_core::GlobalWhitelistEntry;
use image_gate_core::Policy;
use image_gate_core::PolicyId;
use image_gate_core::PolicyRule;
use image_gate_core::RuleParam;
use image_gate_core::TriggerName;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum legacy file size in bytes.
const MAX_LEGACY_FILE_BYTES: u64 = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Legacy file parse errors.
#[derive(Debug, Error)]
pub enum LegacyParseError {
    /// File could not be read.
    #[error("legacy file io error: {0}")]
    Io(String),
    /// A line is malformed.
    #[error("line {line}: {reason}")]
    Line {
        /// 1-based line number.
        line: usize,
        /// Problem description.
        reason: String,
    },
    /// The parsed policy is invalid.
    #[error(transparent)]
    Policy(#[from] BundleError),
}

// ============================================================================
// SECTION: Flat Policy
// ============================================================================

/// Parses a flat policy file into a [`Policy`] with the given id.
///
/// # Errors
///
/// Returns [`LegacyParseError`] for malformed lines or duplicate rules.
pub fn parse_legacy_policy(id: PolicyId, text: &str) -> Result<Policy, LegacyParseError> {
    let mut rules = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        rules.push(parse_policy_line(line).map_err(|reason| LegacyParseError::Line {
            line: index + 1,
            reason,
        })?);
    }
    let policy = Policy {
        name: id.to_string(),
        id,
        version: "1".to_string(),
        rules,
    };
    policy.validate()?;
    Ok(policy)
}

/// Parses one `GATE:TRIGGER:ACTION[:params]` line.
fn parse_policy_line(line: &str) -> Result<PolicyRule, String> {
    let mut parts = line.splitn(4, ':');
    let gate = parts.next().unwrap_or_default().trim();
    let trigger = parts.next().unwrap_or_default().trim();
    let action = parts.next().unwrap_or_default().trim();
    if gate.is_empty() || trigger.is_empty() || action.is_empty() {
        return Err(format!("expected GATE:TRIGGER:ACTION, found `{line}`"));
    }
    let gate = parse_gate(gate)?;
    let action = Action::parse(action).ok_or_else(|| format!("unknown action `{action}`"))?;
    let params = match parts.next() {
        Some(params) => parse_params(params)?,
        None => Vec::new(),
    };
    Ok(PolicyRule {
        gate,
        trigger: TriggerName::new(trigger),
        action,
        params,
    })
}

/// Parses a gate name, rejecting names unusable as file names.
fn parse_gate(text: &str) -> Result<GateName, String> {
    let gate = GateName::new(text);
    if gate.is_valid() {
        Ok(gate)
    } else {
        Err(format!("gate name `{text}` must match {GATE_NAME_PATTERN}"))
    }
}

/// Parses whitespace-separated `name=value` parameters.
fn parse_params(text: &str) -> Result<Vec<RuleParam>, String> {
    text.split_whitespace()
        .map(|token| match token.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok(RuleParam {
                name: name.to_string(),
                value: value.to_string(),
            }),
            _ => Err(format!("parameter `{token}` is not name=value")),
        })
        .collect()
}

/// Reads a flat policy file; the policy id is the file stem.
///
/// # Errors
///
/// Returns [`LegacyParseError`] when the file cannot be read or parsed.
pub fn load_legacy_policy(path: &Path) -> Result<Policy, LegacyParseError> {
    let text = read_limited(path)?;
    let id = path
        .file_stem()
        .map_or_else(|| "policy".to_string(), |stem| stem.to_string_lossy().into_owned());
    parse_legacy_policy(PolicyId::new(id), &text)
}

// ============================================================================
// SECTION: Global Whitelist
// ============================================================================

/// Parses a global whitelist file.
///
/// # Errors
///
/// Returns [`LegacyParseError::Line`] for lines that are not `<gate> <trigger_id>`.
pub fn parse_global_whitelist(text: &str) -> Result<GlobalWhitelist, LegacyParseError> {
    let mut whitelist = GlobalWhitelist::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(gate), Some(trigger_id), None) => {
                let gate = parse_gate(gate).map_err(|reason| LegacyParseError::Line {
                    line: index + 1,
                    reason,
                })?;
                whitelist.push(GlobalWhitelistEntry {
                    gate,
                    trigger_id: trigger_id.to_string(),
                    whitelist_id: None,
                });
            }
            _ => {
                return Err(LegacyParseError::Line {
                    line: index + 1,
                    reason: format!("expected `<gate> <trigger_id>`, found `{line}`"),
                });
            }
        }
    }
    Ok(whitelist)
}

/// Reads a global whitelist file.
///
/// # Errors
///
/// Returns [`LegacyParseError`] when the file cannot be read or parsed.
pub fn load_global_whitelist(path: &Path) -> Result<GlobalWhitelist, LegacyParseError> {
    parse_global_whitelist(&read_limited(path)?)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a UTF-8 file no larger than [`MAX_LEGACY_FILE_BYTES`].
fn read_limited(path: &Path) -> Result<String, LegacyParseError> {
    let metadata = fs::metadata(path)
        .map_err(|err| LegacyParseError::Io(format!("{}: {err}", path.display())))?;
    if metadata.len() > MAX_LEGACY_FILE_BYTES {
        return Err(LegacyParseError::Io(format!(
            "{} exceeds {MAX_LEGACY_FILE_BYTES} bytes",
            path.display()
        )));
    }
    fs::read_to_string(path)
        .map_err(|err| LegacyParseError::Io(format!("{}: {err}", path.display())))
}
