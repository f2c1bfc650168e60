// crates/image-gate-core/src/runtime/cache.rs
// ============================================================================
// Module: Image Gate Evaluation Cache
// Description: Per-run memo of policy evaluations keyed by policy and whitelists.
// Purpose: Evaluate each (policy, whitelist set) pair at most once per image run.
// Dependencies: crate::core, crate::runtime::engine, serde
// ============================================================================

//! ## Overview
//! The cache key is the canonical SHA-256 of `{policy_id, whitelist_ids}` with
//! the whitelist ids sorted and deduplicated, so mapping rules listing the same
//! whitelists in a different order share an entry. A cache lives for one
//! image's bundle run and is owned by that run; it is never persisted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Serialize;

use crate::core::HashDigest;
use crate::core::HashError;
use crate::core::PolicyId;
use crate::core::WhitelistId;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::hash_canonical_json;
use crate::runtime::engine::PolicyEvaluation;

// ============================================================================
// SECTION: Cache Key
// ============================================================================

/// Hashed input of a cache key.
#[derive(Serialize)]
struct CacheKeyMaterial<'a> {
    /// Policy identifier.
    policy_id: &'a PolicyId,
    /// Sorted, deduplicated whitelist identifiers.
    whitelist_ids: BTreeSet<&'a WhitelistId>,
}

/// Evaluation cache key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(HashDigest);

impl CacheKey {
    /// Derives the key for a policy and whitelist set.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn new(policy_id: &PolicyId, whitelist_ids: &[WhitelistId]) -> Result<Self, HashError> {
        let material = CacheKeyMaterial {
            policy_id,
            whitelist_ids: whitelist_ids.iter().collect(),
        };
        Ok(Self(hash_canonical_json(DEFAULT_HASH_ALGORITHM, &material)?))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0.value
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// In-process evaluation cache for one image's bundle run.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    /// Cached evaluations.
    entries: BTreeMap<CacheKey, PolicyEvaluation>,
}

impl EvaluationCache {
    /// Creates an empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the cached evaluation for a key.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&PolicyEvaluation> {
        self.entries.get(key)
    }

    /// Stores an evaluation.
    pub fn insert(&mut self, key: CacheKey, evaluation: PolicyEvaluation) {
        self.entries.insert(key, evaluation);
    }

    /// Returns the number of cached evaluations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
