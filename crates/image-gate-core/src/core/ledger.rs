// crates/image-gate-core/src/core/ledger.rs
// ============================================================================
// Module: Image Gate Whitelist Ledger
// Description: Per-image whitelist ledger with ignore and enforce partitions.
// Purpose: Model and encode the auto-maintained image-local whitelist.
// Dependencies: crate::core::{identifiers, occurrence}, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each image owns a ledger split into `ignore` entries (suppressing) and
//! `enforce` entries (tracked but active). Evaluation only ever appends to
//! `enforce`; promotion to `ignore` is an out-of-band user edit.
//!
//! The on-disk form is line oriented: a `#`-prefixed JSON object is an
//! `ignore` entry, an unprefixed JSON object is an `enforce` entry, and any
//! other `#` line is a comment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::GateName;
use crate::core::identifiers::ImageId;
use crate::core::identifiers::TriggerId;
use crate::core::identifiers::TriggerName;
use crate::core::occurrence::TriggerOccurrence;

/// Comment line written at the top of every rendered ledger.
const LEDGER_HEADER: &str =
    "# image-gate whitelist ledger: prefix a line with '#' to ignore that trigger";

// ============================================================================
// SECTION: Entries
// ============================================================================

/// One ledger entry.
///
/// Current entries carry a `trigger_id`. Entries written by older tooling may
/// instead hold the full occurrence record (trigger and message), which only
/// match when legacy record matching is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Gate the entry applies to.
    pub gate: GateName,
    /// Trigger id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<TriggerId>,
    /// Trigger name, informational for current entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerName>,
    /// Occurrence message, informational for current entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Image id recorded by legacy full-record entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<ImageId>,
}

impl LedgerEntry {
    /// Builds the entry tracking an active occurrence.
    #[must_use]
    pub fn tracking(occurrence: &TriggerOccurrence) -> Self {
        Self {
            gate: occurrence.gate.clone(),
            trigger_id: Some(occurrence.trigger_id.clone()),
            trigger: Some(occurrence.trigger.clone()),
            message: Some(occurrence.message.clone()),
            image_id: None,
        }
    }

    /// Returns true when this entry refers to the occurrence.
    #[must_use]
    pub fn matches(&self, occurrence: &TriggerOccurrence, legacy_records: bool) -> bool {
        if self.gate != occurrence.gate {
            return false;
        }
        if let Some(trigger_id) = &self.trigger_id {
            return trigger_id == &occurrence.trigger_id;
        }
        if !legacy_records {
            return false;
        }
        let image_matches =
            self.image_id.as_ref().is_none_or(|image_id| image_id == &occurrence.image_id);
        image_matches
            && self.trigger.as_ref() == Some(&occurrence.trigger)
            && self.message.as_deref() == Some(occurrence.message.as_str())
    }

    /// Returns true when both entries describe the same ledger slot.
    fn same_slot(&self, other: &Self) -> bool {
        if self.gate != other.gate {
            return false;
        }
        match (&self.trigger_id, &other.trigger_id) {
            (Some(left), Some(right)) => left == right,
            (None, None) => {
                self.trigger == other.trigger
                    && self.message == other.message
                    && self.image_id == other.image_id
            }
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// Image-local whitelist ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLedger {
    /// Suppressing entries.
    pub ignore: Vec<LedgerEntry>,
    /// Tracked but active entries.
    pub enforce: Vec<LedgerEntry>,
}

impl ImageLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ignore: Vec::new(),
            enforce: Vec::new(),
        }
    }

    /// Parses the line-oriented ledger format.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Corrupt`] when an entry line is not a valid entry.
    pub fn parse(text: &str) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix('#') {
                let rest = rest.trim_start();
                if !rest.starts_with('{') {
                    continue;
                }
                ledger.ignore.push(parse_entry(rest, index + 1)?);
            } else {
                ledger.enforce.push(parse_entry(line, index + 1)?);
            }
        }
        Ok(ledger)
    }

    /// Renders the ledger in its line-oriented form.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Corrupt`] when an entry cannot be encoded.
    pub fn render(&self) -> Result<String, LedgerError> {
        let mut out = String::from(LEDGER_HEADER);
        out.push('\n');
        for entry in &self.ignore {
            out.push('#');
            out.push_str(&encode_entry(entry)?);
            out.push('\n');
        }
        for entry in &self.enforce {
            out.push_str(&encode_entry(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Returns true when an `ignore` entry suppresses the occurrence.
    #[must_use]
    pub fn ignores(&self, occurrence: &TriggerOccurrence, legacy_records: bool) -> bool {
        self.ignore.iter().any(|entry| entry.matches(occurrence, legacy_records))
    }

    /// Returns true when either partition already refers to the occurrence.
    #[must_use]
    pub fn tracks(&self, occurrence: &TriggerOccurrence, legacy_records: bool) -> bool {
        self.ignore
            .iter()
            .chain(self.enforce.iter())
            .any(|entry| entry.matches(occurrence, legacy_records))
    }

    /// Appends entries to `enforce` unless either partition already holds them.
    ///
    /// Returns the number of entries appended.
    pub fn track_enforced(&mut self, entries: &[LedgerEntry]) -> usize {
        let mut added = 0;
        for entry in entries {
            let present = self
                .ignore
                .iter()
                .chain(self.enforce.iter())
                .any(|existing| existing.same_slot(entry));
            if !present {
                self.enforce.push(entry.clone());
                added += 1;
            }
        }
        added
    }

    /// Merges another ledger into this one.
    ///
    /// Both partitions are unioned; no entry is dropped or moved.
    pub fn merge(&mut self, other: &Self) {
        for entry in &other.ignore {
            if !self.ignore.iter().any(|existing| existing.same_slot(entry)) {
                self.ignore.push(entry.clone());
            }
        }
        for entry in &other.enforce {
            if !self.enforce.iter().any(|existing| existing.same_slot(entry)) {
                self.enforce.push(entry.clone());
            }
        }
    }
}

/// Parses one JSON ledger entry.
fn parse_entry(text: &str, line: usize) -> Result<LedgerEntry, LedgerError> {
    serde_json::from_str(text)
        .map_err(|err| LedgerError::Corrupt(format!("line {line}: {err}")))
}

/// Encodes one ledger entry as a single JSON line.
fn encode_entry(entry: &LedgerEntry) -> Result<String, LedgerError> {
    serde_json::to_string(entry).map_err(|err| LedgerError::Corrupt(err.to_string()))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ledger load and store errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger I/O failed.
    #[error("whitelist ledger io error: {0}")]
    Io(String),
    /// Ledger content could not be decoded.
    #[error("whitelist ledger corrupt: {0}")]
    Corrupt(String),
    /// Ledger lock could not be acquired.
    #[error("whitelist ledger lock error: {0}")]
    Lock(String),
    /// Image id cannot be used as a ledger key.
    #[error("invalid image id for ledger: {0}")]
    InvalidImageId(String),
}
