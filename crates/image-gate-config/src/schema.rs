// crates/image-gate-config/src/schema.rs
// ============================================================================
// Module: Bundle Schema
// Description: JSON Schema for policy bundle files.
// Purpose: Provide the fixed validation schema applied before decoding.
// Dependencies: image-gate-core, serde_json
// ============================================================================

//! ## Overview
//! This module defines the JSON Schema every bundle must satisfy before it is
//! decoded. The schema checks shape only; cross references and uniqueness
//! are checked afterwards by `Bundle::validate`.

use image_gate_core::GATE_NAME_PATTERN;
use serde_json::Value;
use serde_json::json;

/// Returns the JSON schema for bundle files.
#[must_use]
pub fn bundle_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "image-gate://schemas/bundle.schema.json",
        "title": "Image Gate Policy Bundle",
        "description": "Versioned policies, whitelists, and ordered mapping rules.",
        "type": "object",
        "required": ["id", "policies", "whitelists", "mappings"],
        "properties": {
            "id": non_empty_string(),
            "name": { "type": "string" },
            "version": { "type": "string" },
            "policies": {
                "type": "array",
                "items": policy_schema()
            },
            "whitelists": {
                "type": "array",
                "items": whitelist_schema()
            },
            "mappings": {
                "type": "array",
                "items": mapping_schema()
            }
        },
        "additionalProperties": true
    })
}

/// Non-empty string schema.
fn non_empty_string() -> Value {
    json!({ "type": "string", "minLength": 1 })
}

/// Gate name schema; gate names are used as file names.
fn gate_name() -> Value {
    json!({ "type": "string", "pattern": GATE_NAME_PATTERN })
}

/// Schema for one policy.
fn policy_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "rules"],
        "properties": {
            "id": non_empty_string(),
            "name": { "type": "string" },
            "version": { "type": "string" },
            "rules": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["gate", "trigger", "action"],
                    "properties": {
                        "gate": gate_name(),
                        "trigger": non_empty_string(),
                        "action": {
                            "type": "string",
                            "enum": ["GO", "WARN", "STOP"]
                        },
                        "params": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["name", "value"],
                                "properties": {
                                    "name": non_empty_string(),
                                    "value": { "type": "string" }
                                },
                                "additionalProperties": false
                            }
                        }
                    },
                    "additionalProperties": false
                }
            }
        },
        "additionalProperties": true
    })
}

/// Schema for one whitelist.
fn whitelist_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "items"],
        "properties": {
            "id": non_empty_string(),
            "name": { "type": "string" },
            "version": { "type": "string" },
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["gate", "trigger_id"],
                    "properties": {
                        "gate": gate_name(),
                        "trigger_id": non_empty_string()
                    },
                    "additionalProperties": true
                }
            }
        },
        "additionalProperties": true
    })
}

/// Schema for one mapping rule.
fn mapping_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "policy_id", "registry", "repository", "image"],
        "properties": {
            "id": non_empty_string(),
            "name": { "type": "string" },
            "policy_id": non_empty_string(),
            "whitelist_ids": {
                "type": "array",
                "items": non_empty_string()
            },
            "registry": non_empty_string(),
            "repository": non_empty_string(),
            "image": {
                "type": "object",
                "required": ["type", "value"],
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["tag", "digest", "id"]
                    },
                    "value": non_empty_string()
                },
                "additionalProperties": false
            }
        },
        "additionalProperties": true
    })
}
