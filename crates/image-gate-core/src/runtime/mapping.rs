// crates/image-gate-core/src/runtime/mapping.rs
// ============================================================================
// Module: Image Gate Mapping Resolver
// Description: First-match-wins selection of policy and whitelists for an image.
// Purpose: Bind each requested tag to exactly one bundle policy.
// Dependencies: crate::core, crate::runtime::pattern, thiserror
// ============================================================================

//! ## Overview
//! Mapping rules are walked top to bottom. A rule matches when its registry
//! glob, repository glob, and image selector all match the identity; the first
//! matching rule is returned immediately and later rules are never consulted,
//! even when they are more specific. No match is an error: there is no default
//! policy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Bundle;
use crate::core::ImageId;
use crate::core::ImageIdentity;
use crate::core::ImageSelectorKind;
use crate::core::MappingId;
use crate::core::MappingRule;
use crate::core::Policy;
use crate::core::PolicyId;
use crate::core::Whitelist;
use crate::core::WhitelistId;
use crate::runtime::pattern::GlobPattern;
use crate::runtime::pattern::PatternError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a successful mapping resolution.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'b> {
    /// Position of the matched rule in the bundle's mapping list.
    pub index: usize,
    /// Matched mapping rule.
    pub rule: &'b MappingRule,
    /// Policy selected by the rule.
    pub policy: &'b Policy,
}

impl<'b> Resolution<'b> {
    /// Resolves the rule's whitelists against the bundle.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownWhitelist`] for dangling references.
    pub fn whitelists(&self, bundle: &'b Bundle) -> Result<Vec<&'b Whitelist>, MappingError> {
        self.rule
            .whitelist_ids
            .iter()
            .map(|id| {
                bundle.whitelist(id).ok_or_else(|| MappingError::UnknownWhitelist {
                    mapping: self.rule.id.clone(),
                    whitelist: id.clone(),
                })
            })
            .collect()
    }
}

/// Mapping resolution errors.
#[derive(Debug, Error)]
pub enum MappingError {
    /// No rule matched the image.
    #[error("no mapping rule matches image {image_id} ({registry}/{repository})")]
    NotFound {
        /// Image identifier.
        image_id: ImageId,
        /// Registry of the requested tag.
        registry: String,
        /// Repository of the requested tag.
        repository: String,
    },
    /// A rule glob could not be compiled.
    #[error(transparent)]
    Pattern(#[from] PatternError),
    /// A matched rule references a policy missing from the bundle.
    #[error("mapping {mapping} references unknown policy {policy}")]
    UnknownPolicy {
        /// Mapping identifier.
        mapping: MappingId,
        /// Missing policy identifier.
        policy: PolicyId,
    },
    /// A matched rule references a whitelist missing from the bundle.
    #[error("mapping {mapping} references unknown whitelist {whitelist}")]
    UnknownWhitelist {
        /// Mapping identifier.
        mapping: MappingId,
        /// Missing whitelist identifier.
        whitelist: WhitelistId,
    },
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Returns the first mapping rule matching the identity.
///
/// `candidate_digests` are externally supplied digests matched alongside the
/// identity's known digests for digest selectors.
///
/// # Errors
///
/// Returns [`MappingError::NotFound`] when no rule matches, or a pattern or
/// reference error for the first rule that cannot be evaluated.
pub fn resolve<'b>(
    bundle: &'b Bundle,
    identity: &ImageIdentity,
    candidate_digests: &[String],
) -> Result<Resolution<'b>, MappingError> {
    for (index, rule) in bundle.mappings.iter().enumerate() {
        if !rule_matches(rule, identity, candidate_digests)? {
            continue;
        }
        let policy = bundle.policy(&rule.policy_id).ok_or_else(|| MappingError::UnknownPolicy {
            mapping: rule.id.clone(),
            policy: rule.policy_id.clone(),
        })?;
        return Ok(Resolution {
            index,
            rule,
            policy,
        });
    }
    Err(MappingError::NotFound {
        image_id: identity.image_id.clone(),
        registry: identity.registry.clone(),
        repository: identity.repository.clone(),
    })
}

/// Returns true when a single rule matches the identity.
fn rule_matches(
    rule: &MappingRule,
    identity: &ImageIdentity,
    candidate_digests: &[String],
) -> Result<bool, PatternError> {
    if !GlobPattern::new(&rule.registry)?.matches(&identity.registry) {
        return Ok(false);
    }
    if !GlobPattern::new(&rule.repository)?.matches(&identity.repository) {
        return Ok(false);
    }
    match rule.image.kind {
        ImageSelectorKind::Tag => {
            Ok(GlobPattern::new(&rule.image.value)?.matches_any(&identity.tags))
        }
        ImageSelectorKind::Digest => {
            let pattern = GlobPattern::new(&rule.image.value)?;
            Ok(pattern.matches_any(&identity.digests) || pattern.matches_any(candidate_digests))
        }
        ImageSelectorKind::Id => Ok(rule.image.value == identity.image_id.as_str()),
    }
}
