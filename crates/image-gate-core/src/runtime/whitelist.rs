// crates/image-gate-core/src/runtime/whitelist.rs
// ============================================================================
// Module: Image Gate Whitelist Filter
// Description: Suppression of occurrences by image-local and global whitelists.
// Purpose: Split occurrences into active and suppressed sets deterministically.
// Dependencies: crate::core, crate::runtime::pattern, regex
// ============================================================================

//! ## Overview
//! Suppression is checked in a fixed order and the first hit wins:
//!
//! 1. the image ledger's `ignore` partition (by trigger id, or by the full
//!    occurrence record when legacy record matching is enabled);
//! 2. the global whitelist, where entries containing `*` are globs and every
//!    other entry is an exact trigger id;
//! 3. the advisory prefix compatibility rule: with
//!    [`WhitelistCompat::cve_prefix_whitelist`] enabled, a wildcard-free
//!    `ANCHORESEC` entry that looks like a bare advisory id also matches any
//!    trigger id starting with it.
//!
//! Everything not suppressed is active. [`pending_ledger_entries`] lists the
//! active occurrences the ledger does not yet track.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;

use crate::core::GateName;
use crate::core::ImageLedger;
use crate::core::LedgerEntry;
use crate::core::SuppressedOccurrence;
use crate::core::TriggerOccurrence;
use crate::core::Whitelist;
use crate::core::WhitelistId;
use crate::core::WhitelistSource;
use crate::runtime::pattern::GlobPattern;
use crate::runtime::pattern::PatternError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Gate whose bare advisory entries receive implicit prefix matching.
pub const ADVISORY_GATE: &str = "ANCHORESEC";

/// Shapes accepted as bare advisory identifiers.
const ADVISORY_ID_PATTERN: &str =
    r"^(CVE-\d{4}-\d{4,}|[A-Z]{2,5}SA-\d{4}[-:]\d+(-\d+)?|USN-\d+-\d+|DSA-\d+-\d+)$";

// ============================================================================
// SECTION: Global Whitelist
// ============================================================================

/// One global whitelist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalWhitelistEntry {
    /// Gate the entry applies to.
    pub gate: GateName,
    /// Trigger id or glob.
    pub trigger_id: String,
    /// Bundle whitelist that supplied the entry; `None` for the global file.
    pub whitelist_id: Option<WhitelistId>,
}

/// Global whitelist: bundle whitelist items plus the optional global file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalWhitelist {
    /// Entries in insertion order.
    entries: Vec<GlobalWhitelistEntry>,
}

impl GlobalWhitelist {
    /// Creates an empty global whitelist.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Creates a global whitelist from entries.
    #[must_use]
    pub const fn from_entries(entries: Vec<GlobalWhitelistEntry>) -> Self {
        Self {
            entries,
        }
    }

    /// Adds an entry.
    pub fn push(&mut self, entry: GlobalWhitelistEntry) {
        self.entries.push(entry);
    }

    /// Adds every item of a bundle whitelist.
    pub fn extend_from_bundle(&mut self, whitelist: &Whitelist) {
        self.entries.extend(whitelist.items.iter().map(|item| GlobalWhitelistEntry {
            gate: item.gate.clone(),
            trigger_id: item.trigger_id.clone(),
            whitelist_id: Some(whitelist.id.clone()),
        }));
    }

    /// Appends all entries of another global whitelist.
    pub fn extend(&mut self, other: &Self) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Returns the entries.
    #[must_use]
    pub fn entries(&self) -> &[GlobalWhitelistEntry] {
        &self.entries
    }

    /// Returns the number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when there are no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SECTION: Compatibility
// ============================================================================

/// Compatibility switches for legacy whitelist behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhitelistCompat {
    /// Treat bare advisory ids for the advisory gate as prefixes.
    pub cve_prefix_whitelist: bool,
    /// Match ledger entries that hold a full occurrence record instead of a trigger id.
    pub legacy_ledger_records: bool,
}

impl Default for WhitelistCompat {
    fn default() -> Self {
        Self {
            cve_prefix_whitelist: true,
            legacy_ledger_records: true,
        }
    }
}

// ============================================================================
// SECTION: Filter
// ============================================================================

/// Result of filtering occurrences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Occurrences that count toward the verdict.
    pub active: Vec<TriggerOccurrence>,
    /// Occurrences suppressed by a whitelist.
    pub suppressed: Vec<SuppressedOccurrence>,
}

/// Global entry with its compiled matcher.
#[derive(Debug, Clone)]
struct CompiledEntry {
    /// Source entry.
    entry: GlobalWhitelistEntry,
    /// Compiled trigger id glob.
    pattern: GlobPattern,
    /// Entry qualifies for advisory prefix matching.
    advisory_prefix: bool,
}

/// Compiled whitelist filter.
#[derive(Debug, Clone)]
pub struct WhitelistFilter {
    /// Compiled global entries.
    entries: Vec<CompiledEntry>,
    /// Compatibility switches.
    compat: WhitelistCompat,
}

impl WhitelistFilter {
    /// Compiles the global whitelist.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when an entry glob cannot be compiled.
    pub fn new(global: &GlobalWhitelist, compat: WhitelistCompat) -> Result<Self, PatternError> {
        let advisory = if compat.cve_prefix_whitelist {
            Some(Regex::new(ADVISORY_ID_PATTERN).map_err(|err| PatternError::Invalid {
                pattern: ADVISORY_ID_PATTERN.to_string(),
                error: err.to_string(),
            })?)
        } else {
            None
        };
        let mut entries = Vec::with_capacity(global.len());
        for entry in global.entries() {
            let pattern = GlobPattern::new(&entry.trigger_id)?;
            let advisory_prefix = advisory.as_ref().is_some_and(|regex| {
                entry.gate.as_str() == ADVISORY_GATE
                    && !pattern.is_wildcard()
                    && regex.is_match(&entry.trigger_id)
            });
            entries.push(CompiledEntry {
                entry: entry.clone(),
                pattern,
                advisory_prefix,
            });
        }
        Ok(Self {
            entries,
            compat,
        })
    }

    /// Returns the suppression source for an occurrence, if any.
    #[must_use]
    pub fn classify(
        &self,
        occurrence: &TriggerOccurrence,
        ledger: &ImageLedger,
    ) -> Option<WhitelistSource> {
        if ledger.ignores(occurrence, self.compat.legacy_ledger_records) {
            return Some(WhitelistSource::ImageLedger);
        }
        let trigger_id = occurrence.trigger_id.as_str();
        for compiled in &self.entries {
            if compiled.entry.gate != occurrence.gate {
                continue;
            }
            if compiled.pattern.matches(trigger_id) {
                return Some(WhitelistSource::Global {
                    whitelist_id: compiled.entry.whitelist_id.clone(),
                    pattern: compiled.entry.trigger_id.clone(),
                });
            }
            if compiled.advisory_prefix && trigger_id.starts_with(&compiled.entry.trigger_id) {
                return Some(WhitelistSource::AdvisoryPrefixCompat {
                    whitelist_id: compiled.entry.whitelist_id.clone(),
                    pattern: compiled.entry.trigger_id.clone(),
                });
            }
        }
        None
    }

    /// Splits occurrences into active and suppressed sets, preserving order.
    #[must_use]
    pub fn filter(&self, occurrences: Vec<TriggerOccurrence>, ledger: &ImageLedger) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for occurrence in occurrences {
            match self.classify(&occurrence, ledger) {
                Some(source) => outcome.suppressed.push(SuppressedOccurrence {
                    occurrence,
                    source,
                }),
                None => outcome.active.push(occurrence),
            }
        }
        outcome
    }

    /// Returns the compatibility switches.
    #[must_use]
    pub const fn compat(&self) -> WhitelistCompat {
        self.compat
    }
}

/// Filters occurrences against the image ledger and a global whitelist.
///
/// # Errors
///
/// Returns [`PatternError`] when a global entry cannot be compiled.
pub fn filter_occurrences(
    occurrences: Vec<TriggerOccurrence>,
    ledger: &ImageLedger,
    global: &GlobalWhitelist,
    compat: WhitelistCompat,
) -> Result<FilterOutcome, PatternError> {
    Ok(WhitelistFilter::new(global, compat)?.filter(occurrences, ledger))
}

/// Returns ledger entries for active occurrences the ledger does not track yet.
///
/// Duplicate occurrences within `active` yield a single entry.
#[must_use]
pub fn pending_ledger_entries(
    active: &[TriggerOccurrence],
    ledger: &ImageLedger,
    legacy_records: bool,
) -> Vec<LedgerEntry> {
    let mut pending: Vec<LedgerEntry> = Vec::new();
    for occurrence in active {
        if ledger.tracks(occurrence, legacy_records) {
            continue;
        }
        let entry = LedgerEntry::tracking(occurrence);
        if !pending.iter().any(|existing| existing.matches(occurrence, false)) {
            pending.push(entry);
        }
    }
    pending
}
