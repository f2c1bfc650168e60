// crates/image-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Image Gate Identifiers
// Description: Canonical opaque identifiers for bundles, gates, and images.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the string-based identifiers used throughout Image Gate.
//! Identifiers are opaque and serialize as strings. Validation happens at the
//! bundle and store boundaries rather than inside these wrappers, with the
//! exception of [`GateName`], which is always upper-cased so that legacy files
//! and bundle content compare equal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares an opaque string identifier with the standard accessors.
macro_rules! opaque_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

opaque_identifier!(
    /// Policy bundle identifier.
    BundleId
);

opaque_identifier!(
    /// Policy identifier within a bundle.
    PolicyId
);

opaque_identifier!(
    /// Whitelist identifier within a bundle.
    WhitelistId
);

opaque_identifier!(
    /// Mapping rule identifier within a bundle.
    MappingId
);

opaque_identifier!(
    /// Trigger name declared by a gate (for example `NOFROM`).
    TriggerName
);

opaque_identifier!(
    /// Trigger occurrence identifier, either gate-supplied or derived.
    TriggerId
);

opaque_identifier!(
    /// Resolved image identifier produced by the analyzer.
    ImageId
);

// ============================================================================
// SECTION: Gate Name
// ============================================================================

/// Accepted gate name syntax, shared with the bundle schema.
pub const GATE_NAME_PATTERN: &str = "^[A-Za-z0-9_-]+$";

/// Gate name (for example `DOCKERFILECHECK`). Always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GateName(String);

impl GateName {
    /// Creates a new gate name, normalizing it to upper case.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_uppercase())
    }

    /// Returns the gate name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the name matches [`GATE_NAME_PATTERN`].
    ///
    /// Gate names become executable and output file names, so only valid
    /// names may reach the filesystem.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.bytes().all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-'))
    }
}

impl<'de> Deserialize<'de> for GateName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

impl fmt::Display for GateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for GateName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for GateName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
