// crates/image-gate-core/src/core/bundle.rs
// ============================================================================
// Module: Image Gate Policy Bundle Model
// Description: Policies, whitelists, mapping rules, and the bundle container.
// Purpose: Define the versioned unit evaluated against analyzed images.
// Dependencies: crate::core::{hashing, identifiers}, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`Bundle`] groups policies, whitelists, and ordered mapping rules. Bundles
//! are untrusted input: [`Bundle::validate`] enforces referential integrity and
//! rule uniqueness, and evaluation never runs against a bundle that failed it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::BundleId;
use crate::core::identifiers::GATE_NAME_PATTERN;
use crate::core::identifiers::GateName;
use crate::core::identifiers::MappingId;
use crate::core::identifiers::PolicyId;
use crate::core::identifiers::TriggerName;
use crate::core::identifiers::WhitelistId;

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Action bound to a (gate, trigger) pair by a policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Allow the image to progress.
    Go,
    /// Allow the image to progress with a warning.
    Warn,
    /// Stop the image from progressing.
    Stop,
}

impl Action {
    /// Returns the canonical upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Go => "GO",
            Self::Warn => "WARN",
            Self::Stop => "STOP",
        }
    }

    /// Parses an action label (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GO" => Some(Self::Go),
            "WARN" => Some(Self::Warn),
            "STOP" => Some(Self::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Policies
// ============================================================================

/// Named parameter forwarded to a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleParam {
    /// Parameter name.
    pub name: String,
    /// Parameter value (comma-separated lists are passed through verbatim).
    pub value: String,
}

impl RuleParam {
    /// Renders the parameter in the `name=value` form handed to gate processes.
    #[must_use]
    pub fn to_argument(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Policy rule binding an action to a gate trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Gate that emits the trigger.
    pub gate: GateName,
    /// Trigger name within the gate.
    pub trigger: TriggerName,
    /// Action applied when the trigger fires.
    pub action: Action,
    /// Parameters forwarded to the gate.
    #[serde(default)]
    pub params: Vec<RuleParam>,
}

/// Policy: a versioned list of gate rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier.
    pub id: PolicyId,
    /// Human-readable policy name.
    #[serde(default)]
    pub name: String,
    /// Policy format version.
    #[serde(default)]
    pub version: String,
    /// Ordered gate rules.
    pub rules: Vec<PolicyRule>,
}

impl Policy {
    /// Returns the action declared for a (gate, trigger) pair, if any.
    #[must_use]
    pub fn action_for(&self, gate: &GateName, trigger: &TriggerName) -> Option<Action> {
        self.rules
            .iter()
            .find(|rule| &rule.gate == gate && &rule.trigger == trigger)
            .map(|rule| rule.action)
    }

    /// Returns the distinct gate names referenced by the rules, in first-use order.
    #[must_use]
    pub fn gate_names(&self) -> Vec<GateName> {
        let mut out: Vec<GateName> = Vec::new();
        for rule in &self.rules {
            if !out.contains(&rule.gate) {
                out.push(rule.gate.clone());
            }
        }
        out
    }

    /// Validates a standalone policy.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Invalid`] listing every problem found.
    pub fn validate(&self) -> Result<(), BundleError> {
        let mut problems = Vec::new();
        self.collect_problems(&mut problems);
        if problems.is_empty() { Ok(()) } else { Err(BundleError::Invalid(problems)) }
    }

    /// Collects structural problems in this policy.
    fn collect_problems(&self, problems: &mut Vec<String>) {
        if self.id.as_str().trim().is_empty() {
            problems.push("policy id must be non-empty".to_string());
        }
        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            if rule.gate.as_str().is_empty() || rule.trigger.as_str().trim().is_empty() {
                problems.push(format!("policy {}: rule gate and trigger must be non-empty", self.id));
                continue;
            }
            if !rule.gate.is_valid() {
                problems.push(format!(
                    "policy {}: gate name `{}` must match {GATE_NAME_PATTERN}",
                    self.id, rule.gate
                ));
            }
            if !seen.insert((rule.gate.clone(), rule.trigger.clone())) {
                problems.push(format!(
                    "policy {}: duplicate rule for {}:{}",
                    self.id, rule.gate, rule.trigger
                ));
            }
            for param in &rule.params {
                if param.name.trim().is_empty() {
                    problems.push(format!(
                        "policy {}: rule {}:{} has a parameter without a name",
                        self.id, rule.gate, rule.trigger
                    ));
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Whitelists
// ============================================================================

/// Whitelist item suppressing occurrences of a gate trigger id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistItem {
    /// Gate the item applies to.
    pub gate: GateName,
    /// Trigger id, optionally ending in `*` for prefix matching.
    pub trigger_id: String,
}

/// Whitelist: a versioned set of suppression items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    /// Whitelist identifier.
    pub id: WhitelistId,
    /// Human-readable whitelist name.
    #[serde(default)]
    pub name: String,
    /// Whitelist format version.
    #[serde(default)]
    pub version: String,
    /// Suppression items.
    pub items: Vec<WhitelistItem>,
}

// ============================================================================
// SECTION: Mapping Rules
// ============================================================================

/// Image selector kind used by mapping rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSelectorKind {
    /// Match against candidate tags.
    Tag,
    /// Match against content digests.
    Digest,
    /// Exact match against the resolved image id.
    Id,
}

/// Image selector within a mapping rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSelector {
    /// Selector kind.
    #[serde(rename = "type")]
    pub kind: ImageSelectorKind,
    /// Selector value (glob for tags and digests, literal for ids).
    pub value: String,
}

/// Ordered mapping rule selecting a policy and whitelists for an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Mapping identifier.
    pub id: MappingId,
    /// Human-readable mapping name.
    #[serde(default)]
    pub name: String,
    /// Policy applied when the rule matches.
    pub policy_id: PolicyId,
    /// Whitelists applied when the rule matches.
    #[serde(default)]
    pub whitelist_ids: Vec<WhitelistId>,
    /// Registry glob.
    pub registry: String,
    /// Repository glob.
    pub repository: String,
    /// Image selector.
    pub image: ImageSelector,
}

// ============================================================================
// SECTION: Bundle
// ============================================================================

/// Versioned policy bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Bundle identifier.
    pub id: BundleId,
    /// Human-readable bundle name.
    #[serde(default)]
    pub name: String,
    /// Bundle format version.
    #[serde(default)]
    pub version: String,
    /// Policies available to mapping rules.
    pub policies: Vec<Policy>,
    /// Whitelists available to mapping rules.
    pub whitelists: Vec<Whitelist>,
    /// Ordered mapping rules (first match wins).
    pub mappings: Vec<MappingRule>,
}

impl Bundle {
    /// Returns the policy with the given identifier.
    #[must_use]
    pub fn policy(&self, id: &PolicyId) -> Option<&Policy> {
        self.policies.iter().find(|policy| &policy.id == id)
    }

    /// Returns the whitelist with the given identifier.
    #[must_use]
    pub fn whitelist(&self, id: &WhitelistId) -> Option<&Whitelist> {
        self.whitelists.iter().find(|whitelist| &whitelist.id == id)
    }

    /// Validates referential integrity and rule uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Invalid`] listing every problem found.
    pub fn validate(&self) -> Result<(), BundleError> {
        let mut problems = Vec::new();
        if self.id.as_str().trim().is_empty() {
            problems.push("bundle id must be non-empty".to_string());
        }

        let mut policy_ids = BTreeSet::new();
        for policy in &self.policies {
            if !policy_ids.insert(policy.id.clone()) {
                problems.push(format!("duplicate policy id {}", policy.id));
            }
            policy.collect_problems(&mut problems);
        }

        let mut whitelist_ids = BTreeSet::new();
        for whitelist in &self.whitelists {
            if !whitelist_ids.insert(whitelist.id.clone()) {
                problems.push(format!("duplicate whitelist id {}", whitelist.id));
            }
            for item in &whitelist.items {
                if item.gate.as_str().is_empty() || item.trigger_id.trim().is_empty() {
                    problems.push(format!(
                        "whitelist {}: items require a gate and trigger_id",
                        whitelist.id
                    ));
                } else if !item.gate.is_valid() {
                    problems.push(format!(
                        "whitelist {}: gate name `{}` must match {GATE_NAME_PATTERN}",
                        whitelist.id, item.gate
                    ));
                }
            }
        }

        let mut mapping_ids = BTreeSet::new();
        for mapping in &self.mappings {
            if !mapping_ids.insert(mapping.id.clone()) {
                problems.push(format!("duplicate mapping id {}", mapping.id));
            }
            if !policy_ids.contains(&mapping.policy_id) {
                problems.push(format!(
                    "mapping {} references unknown policy {}",
                    mapping.id, mapping.policy_id
                ));
            }
            for whitelist_id in &mapping.whitelist_ids {
                if !whitelist_ids.contains(whitelist_id) {
                    problems.push(format!(
                        "mapping {} references unknown whitelist {}",
                        mapping.id, whitelist_id
                    ));
                }
            }
            if mapping.registry.is_empty()
                || mapping.repository.is_empty()
                || mapping.image.value.is_empty()
            {
                problems.push(format!(
                    "mapping {}: registry, repository, and image value must be non-empty",
                    mapping.id
                ));
            }
        }

        if problems.is_empty() { Ok(()) } else { Err(BundleError::Invalid(problems)) }
    }

    /// Computes the canonical hash of the bundle.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn canonical_hash_with(&self, algorithm: HashAlgorithm) -> Result<HashDigest, HashError> {
        hash_canonical_json(algorithm, self)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bundle loading and validation errors.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Bundle could not be read.
    #[error("bundle io error: {0}")]
    Io(String),
    /// Bundle exceeds the configured size limit.
    #[error("bundle is {size} bytes (limit {limit})")]
    TooLarge {
        /// Observed size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
    /// Bundle is not valid JSON or does not decode into the model.
    #[error("bundle parse error: {0}")]
    Parse(String),
    /// Bundle failed JSON Schema validation.
    #[error("bundle schema validation failed: {}", .0.join("; "))]
    Schema(Vec<String>),
    /// Bundle failed semantic validation.
    #[error("invalid bundle: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
