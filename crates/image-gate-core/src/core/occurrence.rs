// crates/image-gate-core/src/core/occurrence.rs
// ============================================================================
// Module: Image Gate Trigger Occurrences
// Description: Normalized gate findings, verdicts, and whitelist status.
// Purpose: Carry typed evaluation records from normalization to rendering.
// Dependencies: crate::core::{bundle, identifiers}, serde
// ============================================================================

//! ## Overview
//! A [`TriggerOccurrence`] is one normalized gate finding bound to the action
//! the active policy declares for it. Occurrences are produced fresh for every
//! evaluation; the terminal `FINAL/FINAL` record carries the aggregated
//! [`Verdict`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::bundle::Action;
use crate::core::identifiers::GateName;
use crate::core::identifiers::ImageId;
use crate::core::identifiers::TriggerId;
use crate::core::identifiers::TriggerName;
use crate::core::identifiers::WhitelistId;

/// Gate and trigger name used for the synthetic terminal record.
pub const FINAL_RECORD_NAME: &str = "FINAL";

// ============================================================================
// SECTION: Payload
// ============================================================================

/// Gate output payload, classified once at normalization time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerPayload {
    /// Free text payload; the trigger id is derived by hashing.
    PlainText {
        /// Payload text.
        text: String,
    },
    /// JSON payload carrying a stable gate-supplied id.
    Structured {
        /// Gate-supplied trigger id.
        id: String,
        /// Optional display message.
        desc: Option<String>,
    },
}

// ============================================================================
// SECTION: Occurrences
// ============================================================================

/// Normalized trigger occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOccurrence {
    /// Image the occurrence was produced for.
    pub image_id: ImageId,
    /// Gate that emitted the trigger.
    pub gate: GateName,
    /// Trigger name.
    pub trigger: TriggerName,
    /// Stable or derived trigger id.
    pub trigger_id: TriggerId,
    /// Display message.
    pub message: String,
    /// Action declared by the active policy.
    pub action: Action,
}

impl TriggerOccurrence {
    /// Builds the synthetic terminal record for a verdict.
    #[must_use]
    pub fn final_record(image_id: &ImageId, verdict: Verdict) -> Self {
        Self {
            image_id: image_id.clone(),
            gate: GateName::new(FINAL_RECORD_NAME),
            trigger: TriggerName::new(FINAL_RECORD_NAME),
            trigger_id: TriggerId::new(FINAL_RECORD_NAME),
            message: String::new(),
            action: verdict.as_action(),
        }
    }

    /// Returns true when this is the synthetic terminal record.
    #[must_use]
    pub fn is_final_record(&self) -> bool {
        self.gate.as_str() == FINAL_RECORD_NAME && self.trigger.as_str() == FINAL_RECORD_NAME
    }
}

/// Where a suppressing whitelist entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum WhitelistSource {
    /// Image-local ledger `ignore` partition.
    ImageLedger,
    /// Global whitelist entry; `whitelist_id` is set for bundle whitelists.
    Global {
        /// Bundle whitelist that supplied the entry, if any.
        whitelist_id: Option<WhitelistId>,
        /// Entry pattern that matched.
        pattern: String,
    },
    /// Implicit advisory-prefix match kept for CVE gate compatibility.
    AdvisoryPrefixCompat {
        /// Bundle whitelist that supplied the entry, if any.
        whitelist_id: Option<WhitelistId>,
        /// Entry pattern that matched.
        pattern: String,
    },
}

/// Occurrence suppressed by a whitelist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressedOccurrence {
    /// Suppressed occurrence.
    pub occurrence: TriggerOccurrence,
    /// Suppression source.
    pub source: WhitelistSource,
}

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Aggregated evaluation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// No active occurrence requires attention.
    Go,
    /// At least one active occurrence warns.
    Warn,
    /// At least one active occurrence stops the image.
    Stop,
}

impl Verdict {
    /// Returns the canonical upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Go => "GO",
            Self::Warn => "WARN",
            Self::Stop => "STOP",
        }
    }

    /// Returns the matching policy action.
    #[must_use]
    pub const fn as_action(self) -> Action {
        match self {
            Self::Go => Action::Go,
            Self::Warn => Action::Warn,
            Self::Stop => Action::Stop,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
