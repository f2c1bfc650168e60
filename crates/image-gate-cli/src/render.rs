// crates/image-gate-cli/src/render.rs
// ============================================================================
// Module: Verdict Rendering
// Description: Table and JSON views of gate evaluation results.
// Purpose: Turn engine results into operator-facing reports.
// Dependencies: image-gate-core, serde
// ============================================================================

//! ## Overview
//! A [`GateReport`] collects one entry per evaluated tag (or a single entry
//! for a flat policy run). The table view prints one block per successful
//! entry: active occurrences first, optionally the suppressed ones, then the
//! `FINAL` row. The JSON view serializes the report as is.

// ============================================================================
// SECTION: Imports
// ============================================================================

use image_gate_cli::t;
use image_gate_core::BundleRun;
use image_gate_core::EvaluationWarning;
use image_gate_core::ImageId;
use image_gate_core::MappingId;
use image_gate_core::PolicyEvaluation;
use image_gate_core::TriggerOccurrence;
use image_gate_core::Verdict;
use image_gate_core::WhitelistId;
use image_gate_core::WhitelistSource;
use serde::Serialize;

// ============================================================================
// SECTION: Report Model
// ============================================================================

/// Evaluation results for one image.
#[derive(Debug, Serialize)]
pub struct GateReport {
    /// Image evaluated.
    pub image_id: ImageId,
    /// One entry per evaluated tag.
    pub results: Vec<TagReport>,
}

/// Result for one tag, or for a flat policy run when `tag` is absent.
#[derive(Debug, Serialize)]
pub struct TagReport {
    /// Requested tag reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Matched mapping rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<MappingId>,
    /// Matched mapping rule name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_name: Option<String>,
    /// Evaluation reused an earlier identical evaluation.
    pub cache_hit: bool,
    /// Evaluation result when the tag succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<PolicyEvaluation>,
    /// Error text when the tag failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GateReport {
    /// Builds a report from a bundle run, keeping request order.
    pub fn from_bundle_run(run: BundleRun) -> Self {
        let results = run
            .tags
            .into_iter()
            .map(|tag| match tag.outcome {
                Ok(verdict) => TagReport {
                    tag: Some(tag.tag),
                    mapping_id: Some(verdict.mapping_id),
                    mapping_name: Some(verdict.mapping_name),
                    cache_hit: verdict.cache_hit,
                    evaluation: Some(verdict.evaluation),
                    error: None,
                },
                Err(err) => TagReport {
                    tag: Some(tag.tag),
                    mapping_id: None,
                    mapping_name: None,
                    cache_hit: false,
                    evaluation: None,
                    error: Some(err.to_string()),
                },
            })
            .collect();
        Self {
            image_id: run.image_id,
            results,
        }
    }

    /// Builds a report from a single flat policy evaluation.
    pub fn from_policy_evaluation(evaluation: PolicyEvaluation) -> Self {
        Self {
            image_id: evaluation.image_id.clone(),
            results: vec![TagReport {
                tag: None,
                mapping_id: None,
                mapping_name: None,
                cache_hit: false,
                evaluation: Some(evaluation),
                error: None,
            }],
        }
    }

    /// Returns true when any entry failed.
    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|result| result.error.is_some())
    }

    /// Returns the most severe verdict across successful entries.
    pub fn worst_verdict(&self) -> Option<Verdict> {
        self.results
            .iter()
            .filter_map(|result| result.evaluation.as_ref())
            .map(|evaluation| evaluation.verdict)
            .max()
    }

    /// Returns warnings from every successful entry.
    pub fn warnings(&self) -> impl Iterator<Item = &EvaluationWarning> {
        self.results
            .iter()
            .filter_map(|result| result.evaluation.as_ref())
            .flat_map(|evaluation| evaluation.warnings.iter())
    }

    /// Returns `(tag, error)` pairs for failed entries.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter().filter_map(|result| {
            result
                .error
                .as_deref()
                .map(|error| (result.tag.as_deref().unwrap_or_default(), error))
        })
    }
}

// ============================================================================
// SECTION: Table View
// ============================================================================

/// Optional table columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayOptions {
    /// Adds the trigger id column.
    pub show_trigger_ids: bool,
    /// Adds the whitelisted column and the suppressed rows.
    pub show_whitelisted: bool,
}

/// Renders every successful entry as a text table.
pub fn render_tables(report: &GateReport, display: DisplayOptions) -> String {
    let mut blocks = Vec::new();
    for result in &report.results {
        let Some(evaluation) = &result.evaluation else {
            continue;
        };
        let tag = result.tag.clone().unwrap_or_else(|| t!("gate.table.no_tag"));
        blocks.push(render_table(evaluation, &tag, display));
    }
    blocks.join("\n")
}

/// Renders one evaluation.
fn render_table(evaluation: &PolicyEvaluation, tag: &str, display: DisplayOptions) -> String {
    let mut header = vec![
        t!("gate.table.image_id"),
        t!("gate.table.repo_tag"),
        t!("gate.table.gate"),
        t!("gate.table.trigger"),
        t!("gate.table.check_output"),
        t!("gate.table.gate_action"),
    ];
    if display.show_trigger_ids {
        header.push(t!("gate.table.trigger_id"));
    }
    if display.show_whitelisted {
        header.push(t!("gate.table.whitelisted"));
    }

    let mut rows = Vec::new();
    let not_whitelisted = t!("gate.whitelisted.none");
    let (final_record, active) = match evaluation.records.split_last() {
        Some((last, rest)) if last.is_final_record() => (Some(last), rest),
        _ => (None, evaluation.records.as_slice()),
    };
    for occurrence in active {
        rows.push(row(occurrence, tag, display, &not_whitelisted));
    }
    if display.show_whitelisted {
        for suppressed in &evaluation.suppressed {
            let label = whitelist_label(&suppressed.source);
            rows.push(row(&suppressed.occurrence, tag, display, &label));
        }
    }
    if let Some(final_record) = final_record {
        rows.push(row(final_record, tag, display, &not_whitelisted));
    }
    format_columns(&header, &rows)
}

/// Builds one table row.
fn row(
    occurrence: &TriggerOccurrence,
    tag: &str,
    display: DisplayOptions,
    whitelisted: &str,
) -> Vec<String> {
    let mut cells = vec![
        occurrence.image_id.to_string(),
        tag.to_string(),
        occurrence.gate.to_string(),
        occurrence.trigger.to_string(),
        occurrence.message.clone(),
        occurrence.action.as_str().to_string(),
    ];
    if display.show_trigger_ids {
        cells.push(occurrence.trigger_id.to_string());
    }
    if display.show_whitelisted {
        cells.push(whitelisted.to_string());
    }
    cells
}

/// Describes where a suppression came from.
pub fn whitelist_label(source: &WhitelistSource) -> String {
    match source {
        WhitelistSource::ImageLedger => t!("gate.whitelisted.ledger"),
        WhitelistSource::Global {
            whitelist_id,
            pattern,
        } => t!(
            "gate.whitelisted.global",
            whitelist = whitelist_name(whitelist_id.as_ref()),
            pattern = pattern
        ),
        WhitelistSource::AdvisoryPrefixCompat {
            whitelist_id,
            pattern,
        } => t!(
            "gate.whitelisted.advisory_prefix",
            whitelist = whitelist_name(whitelist_id.as_ref()),
            pattern = pattern
        ),
    }
}

/// Bundle whitelist id, or the global file label.
fn whitelist_name(whitelist_id: Option<&WhitelistId>) -> String {
    whitelist_id.map_or_else(|| t!("gate.whitelisted.global_label"), ToString::to_string)
}

/// Left-aligns cells into columns separated by two spaces.
fn format_columns(header: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|cell| cell.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    let mut out = String::new();
    let lines = std::iter::once(header)
        .chain(std::iter::once(rule.as_slice()))
        .chain(rows.iter().map(Vec::as_slice));
    for line in lines {
        let padded: Vec<String> = line
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(padded.join("  ").trim_end());
        out.push('\n');
    }
    out
}
