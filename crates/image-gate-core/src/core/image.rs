// crates/image-gate-core/src/core/image.rs
// ============================================================================
// Module: Image Gate Image Identity
// Description: Image references, analyzer metadata, and mapping identities.
// Purpose: Describe what the mapping resolver knows about a target image.
// Dependencies: crate::core::identifiers, serde, thiserror
// ============================================================================

//! ## Overview
//! The analyzer records each image with its id, known tags, and content
//! digests ([`ImageRecord`]). For every requested tag the engine derives an
//! [`ImageIdentity`]: the tag's registry and repository, the tag plus its
//! aliases in the same repository, and the known digests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ImageId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Registry assumed when a reference omits one.
pub const DEFAULT_REGISTRY: &str = "docker.io";
/// Repository namespace assumed for single-component repositories on the default registry.
const DEFAULT_NAMESPACE: &str = "library";
/// Tag assumed when a reference omits one.
pub const DEFAULT_TAG: &str = "latest";

// ============================================================================
// SECTION: Image Reference
// ============================================================================

/// Parsed `registry/repository[:tag][@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry host (with optional port).
    pub registry: String,
    /// Repository path.
    pub repository: String,
    /// Tag, when the reference names one.
    pub tag: Option<String>,
    /// Content digest, when the reference pins one.
    pub digest: Option<String>,
}

/// Errors raised when parsing image references.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    /// Reference is empty or structurally invalid.
    #[error("invalid image reference `{0}`")]
    Invalid(String),
}

impl ImageReference {
    /// Parses a reference, applying docker defaults for registry and tag.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::Invalid`] for empty or malformed references.
    pub fn parse(input: &str) -> Result<Self, ReferenceError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(ReferenceError::Invalid(input.to_string()));
        }

        let (name_part, digest) = match trimmed.split_once('@') {
            Some((name, digest)) if !digest.is_empty() => (name, Some(digest.to_string())),
            Some(_) => return Err(ReferenceError::Invalid(input.to_string())),
            None => (trimmed, None),
        };

        let (name, tag) = split_tag(name_part);
        if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
            return Err(ReferenceError::Invalid(input.to_string()));
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if looks_like_registry(first) => {
                (first.to_string(), rest.to_string())
            }
            _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        };
        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("{DEFAULT_NAMESPACE}/{repository}")
        } else {
            repository
        };
        let tag = match (tag, &digest) {
            (Some(tag), _) => Some(tag.to_string()),
            (None, Some(_)) => None,
            (None, None) => Some(DEFAULT_TAG.to_string()),
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Renders the reference in its fully qualified form.
    #[must_use]
    pub fn to_full_string(&self) -> String {
        let mut out = format!("{}/{}", self.registry, self.repository);
        if let Some(tag) = &self.tag {
            out.push(':');
            out.push_str(tag);
        }
        if let Some(digest) = &self.digest {
            out.push('@');
            out.push_str(digest);
        }
        out
    }

    /// Returns true when both references name the same registry and repository.
    #[must_use]
    pub fn same_repository(&self, other: &Self) -> bool {
        self.registry == other.registry && self.repository == other.repository
    }
}

/// Splits a trailing `:tag` from a name, ignoring registry port separators.
fn split_tag(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once(':') {
        Some((head, tag)) if !tag.contains('/') && !tag.is_empty() => (head, Some(tag)),
        _ => (name, None),
    }
}

/// Returns true when the first path component names a registry host.
fn looks_like_registry(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

// ============================================================================
// SECTION: Image Record
// ============================================================================

/// Analyzer metadata for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Resolved image identifier.
    pub image_id: ImageId,
    /// Fully qualified tag references known for the image.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Content digests known for the image.
    #[serde(default)]
    pub digests: Vec<String>,
}

impl ImageRecord {
    /// Creates a record with no tags or digests.
    #[must_use]
    pub const fn new(image_id: ImageId) -> Self {
        Self {
            image_id,
            tags: Vec::new(),
            digests: Vec::new(),
        }
    }

    /// Builds the mapping identity for a requested tag reference.
    ///
    /// Tags of the same registry/repository recorded for this image are added
    /// as aliases. Unparseable recorded tags are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError`] when the requested reference is invalid.
    pub fn identity_for(&self, requested: &str) -> Result<ImageIdentity, ReferenceError> {
        let reference = ImageReference::parse(requested)?;
        let mut tags = BTreeSet::new();
        if let Some(tag) = &reference.tag {
            tags.insert(tag.clone());
        }
        for known in &self.tags {
            let Ok(alias) = ImageReference::parse(known) else {
                continue;
            };
            if alias.same_repository(&reference)
                && let Some(tag) = alias.tag
            {
                tags.insert(tag);
            }
        }
        let mut digests: BTreeSet<String> = self.digests.iter().cloned().collect();
        if let Some(digest) = &reference.digest {
            digests.insert(digest.clone());
        }
        Ok(ImageIdentity {
            registry: reference.registry,
            repository: reference.repository,
            tags,
            digests,
            image_id: self.image_id.clone(),
        })
    }
}

// ============================================================================
// SECTION: Image Identity
// ============================================================================

/// Everything the mapping resolver may match against for one requested tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageIdentity {
    /// Registry host.
    pub registry: String,
    /// Repository path.
    pub repository: String,
    /// Requested tag plus aliases.
    pub tags: BTreeSet<String>,
    /// Known content digests.
    pub digests: BTreeSet<String>,
    /// Resolved image identifier.
    pub image_id: ImageId,
}
