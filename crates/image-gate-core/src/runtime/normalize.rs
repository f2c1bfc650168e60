// crates/image-gate-core/src/runtime/normalize.rs
// ============================================================================
// Module: Image Gate Trigger Normalizer
// Description: Parses raw gate output into typed trigger occurrences.
// Purpose: Decide payload shape once and bind policy actions to findings.
// Dependencies: crate::core, crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! Every gate output line is `<trigger-name> <payload>`. The payload is
//! classified once into [`TriggerPayload`]: a JSON object with a scalar `id`
//! becomes [`TriggerPayload::Structured`], anything else is plain text whose
//! trigger id is derived by hashing. Only (gate, trigger) pairs declared by
//! the active policy survive normalization.
//!
//! Malformed lines never abort the evaluation. They are returned as
//! [`MalformedLine`] records for the caller to report.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::GateName;
use crate::core::ImageId;
use crate::core::Policy;
use crate::core::TriggerId;
use crate::core::TriggerName;
use crate::core::TriggerOccurrence;
use crate::core::TriggerPayload;
use crate::core::hashing::derive_trigger_digest;
use crate::interfaces::RawGateOutput;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One parsed `<trigger-name> <payload>` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    /// Trigger name.
    pub trigger: TriggerName,
    /// Raw payload text after the first whitespace.
    pub raw_payload: String,
    /// Classified payload.
    pub payload: TriggerPayload,
}

impl ParsedRecord {
    /// Returns the trigger id: gate-supplied when structured, derived otherwise.
    #[must_use]
    pub fn trigger_id(&self, gate: &GateName) -> TriggerId {
        match &self.payload {
            TriggerPayload::Structured {
                id, ..
            } => TriggerId::new(id.clone()),
            TriggerPayload::PlainText {
                text,
            } => TriggerId::new(derive_trigger_digest(gate.as_str(), self.trigger.as_str(), text)),
        }
    }

    /// Returns the display message.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.payload {
            TriggerPayload::Structured {
                desc: Some(desc), ..
            } => desc.clone(),
            TriggerPayload::Structured {
                desc: None, ..
            } => self.raw_payload.clone(),
            TriggerPayload::PlainText {
                text,
            } => text.clone(),
        }
    }
}

/// Gate output line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// Gate that produced the line.
    pub gate: GateName,
    /// 1-based line number.
    pub line: usize,
    /// Reason the line was skipped.
    pub reason: String,
}

/// Normalization result for one gate's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedOutput {
    /// Occurrences declared by the active policy.
    pub occurrences: Vec<TriggerOccurrence>,
    /// Lines skipped as malformed.
    pub malformed: Vec<MalformedLine>,
    /// Well-formed records dropped because the policy does not declare them.
    pub undeclared: usize,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Classifies a payload string.
#[must_use]
pub fn classify_payload(payload: &str) -> TriggerPayload {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(payload)
        && let Some(id) = map.get("id").and_then(scalar_id)
    {
        let desc = match map.get("desc") {
            Some(Value::String(desc)) => Some(desc.clone()),
            _ => None,
        };
        return TriggerPayload::Structured {
            id,
            desc,
        };
    }
    TriggerPayload::PlainText {
        text: payload.to_string(),
    }
}

/// Converts a scalar JSON `id` to its trigger id text.
fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        Value::Bool(id) => Some(id.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Parses one output line. Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns the skip reason when the line has no payload or an invalid trigger name.
pub fn parse_record(line: &str) -> Result<Option<ParsedRecord>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some((trigger, payload)) = line.split_once(char::is_whitespace) else {
        return Err(format!("trigger `{line}` has no payload"));
    };
    if !trigger.chars().all(is_trigger_char) {
        return Err(format!("invalid trigger name `{trigger}`"));
    }
    let payload = payload.trim_start();
    if payload.is_empty() {
        return Err(format!("trigger `{trigger}` has no payload"));
    }
    Ok(Some(ParsedRecord {
        trigger: TriggerName::new(trigger),
        raw_payload: payload.to_string(),
        payload: classify_payload(payload),
    }))
}

/// Returns true for characters allowed in trigger names.
const fn is_trigger_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes one raw line into an occurrence.
///
/// Returns `Ok(None)` for blank lines and for triggers the policy does not
/// declare for the gate.
///
/// # Errors
///
/// Returns the skip reason for malformed lines.
pub fn normalize(
    image_id: &ImageId,
    policy: &Policy,
    gate: &GateName,
    raw_line: &str,
) -> Result<Option<TriggerOccurrence>, String> {
    let Some(record) = parse_record(raw_line)? else {
        return Ok(None);
    };
    let Some(action) = policy.action_for(gate, &record.trigger) else {
        return Ok(None);
    };
    Ok(Some(TriggerOccurrence {
        image_id: image_id.clone(),
        gate: gate.clone(),
        trigger_id: record.trigger_id(gate),
        message: record.message(),
        trigger: record.trigger,
        action,
    }))
}

/// Normalizes every line of a gate's raw output.
#[must_use]
pub fn normalize_output(
    image_id: &ImageId,
    policy: &Policy,
    output: &RawGateOutput,
) -> NormalizedOutput {
    let mut result = NormalizedOutput::default();
    for (index, chunk) in output.bytes.split(|byte| *byte == b'\n').enumerate() {
        let line_number = index + 1;
        let Ok(line) = std::str::from_utf8(chunk) else {
            result.malformed.push(MalformedLine {
                gate: output.gate.clone(),
                line: line_number,
                reason: "line is not valid utf-8".to_string(),
            });
            continue;
        };
        match normalize(image_id, policy, &output.gate, line) {
            Ok(Some(occurrence)) => result.occurrences.push(occurrence),
            Ok(None) => {
                if !line.trim().is_empty() {
                    result.undeclared += 1;
                }
            }
            Err(reason) => result.malformed.push(MalformedLine {
                gate: output.gate.clone(),
                line: line_number,
                reason,
            }),
        }
    }
    result
}
