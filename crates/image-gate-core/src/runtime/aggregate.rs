// crates/image-gate-core/src/runtime/aggregate.rs
// ============================================================================
// Module: Image Gate Action Aggregator
// Description: Reduces active occurrences to a single verdict.
// Purpose: Apply STOP > WARN > GO precedence and emit the terminal record.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Any active STOP forces STOP, otherwise any WARN forces WARN, otherwise the
//! verdict is GO. The result set handed downstream always ends with a
//! synthetic `FINAL/FINAL` record carrying the verdict.

use crate::core::Action;
use crate::core::ImageId;
use crate::core::TriggerOccurrence;
use crate::core::Verdict;

/// Aggregates active occurrences into a verdict.
#[must_use]
pub fn aggregate(active: &[TriggerOccurrence]) -> Verdict {
    if active.iter().any(|occurrence| occurrence.action == Action::Stop) {
        return Verdict::Stop;
    }
    if active.iter().any(|occurrence| occurrence.action == Action::Warn) {
        return Verdict::Warn;
    }
    Verdict::Go
}

/// Aggregates and returns the active set followed by the terminal record.
#[must_use]
pub fn finalize(image_id: &ImageId, active: Vec<TriggerOccurrence>) -> (Verdict, Vec<TriggerOccurrence>) {
    let verdict = aggregate(&active);
    let mut records = active;
    records.push(TriggerOccurrence::final_record(image_id, verdict));
    (verdict, records)
}
