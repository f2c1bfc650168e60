// crates/image-gate-core/tests/engine.rs
// ============================================================================
// Module: Evaluation Engine Tests
// Description: End-to-end tests for policy and bundle evaluation.
// Purpose: Validate verdicts, caching, ledger upkeep, and fail-closed errors.
// Dependencies: image-gate-core, tempfile
// ============================================================================

//! ## Overview
//! Drives the engine with a scripted in-process gate runner that counts
//! invocations, plus in-memory ledger and output stores.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use image_gate_core::Action;
use image_gate_core::Bundle;
use image_gate_core::BundleId;
use image_gate_core::CancellationToken;
use image_gate_core::EvaluationContext;
use image_gate_core::EvaluationError;
use image_gate_core::EvaluationOptions;
use image_gate_core::EvaluationWarning;
use image_gate_core::GateError;
use image_gate_core::GateInvocation;
use image_gate_core::GateName;
use image_gate_core::GateOutputStore;
use image_gate_core::GateRequest;
use image_gate_core::GateRunner;
use image_gate_core::GateSource;
use image_gate_core::GlobalWhitelist;
use image_gate_core::ImageId;
use image_gate_core::ImageLedger;
use image_gate_core::ImageRecord;
use image_gate_core::ImageSelector;
use image_gate_core::ImageSelectorKind;
use image_gate_core::LedgerEntry;
use image_gate_core::LedgerError;
use image_gate_core::LedgerStore;
use image_gate_core::MappingId;
use image_gate_core::MappingRule;
use image_gate_core::Policy;
use image_gate_core::PolicyId;
use image_gate_core::PolicyRule;
use image_gate_core::RawGateOutput;
use image_gate_core::RuleParam;
use image_gate_core::TriggerName;
use image_gate_core::Verdict;
use image_gate_core::Whitelist;
use image_gate_core::WhitelistId;
use image_gate_core::WhitelistItem;
use image_gate_core::runtime::InMemoryGateOutputStore;
use image_gate_core::runtime::InMemoryLedgerStore;
use image_gate_core::runtime::MappingError;
use image_gate_core::runtime::RecordingLogSink;
use image_gate_core::runtime::evaluate_image_policy;
use image_gate_core::runtime::run_bundle;
use tempfile::TempDir;

// ============================================================================
// SECTION: Scripted Gate Runner
// ============================================================================

/// Gate runner returning canned output and recording every invocation.
#[derive(Default)]
struct ScriptedRunner {
    /// Canned output per gate; a missing gate fails with exit status 1.
    outputs: BTreeMap<GateName, String>,
    /// Invocations received, in order.
    calls: Mutex<Vec<GateInvocation>>,
    /// Token cancelled when the named gate runs.
    cancel_on: Option<(GateName, CancellationToken)>,
}

impl ScriptedRunner {
    fn with_output(mut self, gate: &str, text: &str) -> Self {
        self.outputs.insert(GateName::new(gate), text.to_string());
        self
    }

    fn calls(&self) -> Vec<GateInvocation> {
        self.calls.lock().unwrap().clone()
    }
}

impl GateRunner for ScriptedRunner {
    fn run(&self, invocation: &GateInvocation, request: &GateRequest<'_>) -> Result<RawGateOutput, GateError> {
        assert!(request.image_list_file.is_file());
        assert!(request.output_dir.is_dir());
        self.calls.lock().unwrap().push(invocation.clone());
        if let Some((gate, token)) = &self.cancel_on
            && gate == &invocation.gate
        {
            token.cancel();
            return Err(GateError::Cancelled(invocation.gate.clone()));
        }
        match self.outputs.get(&invocation.gate) {
            Some(text) => Ok(RawGateOutput {
                gate: invocation.gate.clone(),
                bytes: text.as_bytes().to_vec(),
                diagnostics: String::new(),
            }),
            None => Err(GateError::ExitStatus {
                gate: invocation.gate.clone(),
                code: Some(1),
                diagnostics: "boom".to_string(),
            }),
        }
    }
}

/// Ledger store whose loads always fail.
struct BrokenLedgerStore;

impl LedgerStore for BrokenLedgerStore {
    fn load(&self, _image_id: &ImageId) -> Result<ImageLedger, LedgerError> {
        Err(LedgerError::Corrupt("line 1: expected value".to_string()))
    }

    fn record_enforced(&self, _image_id: &ImageId, _entries: &[LedgerEntry]) -> Result<usize, LedgerError> {
        panic!("a ledger that failed to load must not be written");
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Shared collaborators for one test.
struct Harness {
    /// Workspace and data store root.
    _dir: TempDir,
    /// Evaluation options.
    options: EvaluationOptions,
    /// Ledger store.
    ledger: InMemoryLedgerStore,
    /// Output store.
    outputs: InMemoryGateOutputStore,
    /// Log sink.
    log: RecordingLogSink,
    /// Global whitelist.
    global: GlobalWhitelist,
    /// Cancellation token.
    cancel: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let options = EvaluationOptions::new(dir.path().join("data"), dir.path().join("work"));
        Self {
            _dir: dir,
            options,
            ledger: InMemoryLedgerStore::new(),
            outputs: InMemoryGateOutputStore::new(),
            log: RecordingLogSink::new(),
            global: GlobalWhitelist::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn context<'a>(&'a self, runner: &'a dyn GateRunner) -> EvaluationContext<'a> {
        EvaluationContext {
            options: &self.options,
            runner,
            ledger: &self.ledger,
            outputs: &self.outputs,
            log: &self.log,
            global_whitelist: &self.global,
            cancel: &self.cancel,
        }
    }
}

fn rule(gate: &str, trigger: &str, action: Action) -> PolicyRule {
    PolicyRule {
        gate: GateName::new(gate),
        trigger: TriggerName::new(trigger),
        action,
        params: Vec::new(),
    }
}

fn dockerfile_policy() -> Policy {
    Policy {
        id: PolicyId::new("dockerfile"),
        name: "dockerfile".to_string(),
        version: "1".to_string(),
        rules: vec![rule("DOCKERFILECHECK", "NOFROM", Action::Stop)],
    }
}

fn mapping(id: &str, policy_id: &str, tag: &str, whitelist_ids: &[&str]) -> MappingRule {
    MappingRule {
        id: MappingId::new(id),
        name: id.to_string(),
        policy_id: PolicyId::new(policy_id),
        whitelist_ids: whitelist_ids.iter().map(|id| WhitelistId::new(*id)).collect(),
        registry: "docker.io".to_string(),
        repository: "library/app".to_string(),
        image: ImageSelector {
            kind: ImageSelectorKind::Tag,
            value: tag.to_string(),
        },
    }
}

fn bundle(policies: Vec<Policy>, mappings: Vec<MappingRule>) -> Bundle {
    Bundle {
        id: BundleId::new("bundle"),
        name: "bundle".to_string(),
        version: "1".to_string(),
        policies,
        whitelists: vec![
            Whitelist {
                id: WhitelistId::new("wl-a"),
                name: "a".to_string(),
                version: "1".to_string(),
                items: vec![WhitelistItem {
                    gate: GateName::new("PKGCHECK"),
                    trigger_id: "openssl-*".to_string(),
                }],
            },
            Whitelist {
                id: WhitelistId::new("wl-b"),
                name: "b".to_string(),
                version: "1".to_string(),
                items: Vec::new(),
            },
        ],
        mappings,
    }
}

fn record() -> ImageRecord {
    ImageRecord {
        image_id: ImageId::new("img-1"),
        tags: vec!["docker.io/library/app:latest".to_string(), "docker.io/library/app:v2".to_string()],
        digests: Vec::new(),
    }
}

/// Record without tag aliases, so each requested tag resolves on its own.
fn unaliased_record() -> ImageRecord {
    ImageRecord::new(ImageId::new("img-1"))
}

// ============================================================================
// SECTION: Policy Evaluation
// ============================================================================

/// Verifies a Dockerfile without FROM stops the image with a FINAL record.
#[test]
fn nofrom_dockerfile_stops_image() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "NOFROM No FROM line in Dockerfile\n");
    let image = ImageId::new("img-1");
    let evaluation = evaluate_image_policy(&harness.context(&runner), &dockerfile_policy(), &image).unwrap();

    assert_eq!(evaluation.verdict, Verdict::Stop);
    assert_eq!(evaluation.active().len(), 1);
    assert_eq!(evaluation.active()[0].trigger.as_str(), "NOFROM");
    assert_eq!(evaluation.active()[0].action, Action::Stop);
    let last = evaluation.records.last().unwrap();
    assert_eq!((last.gate.as_str(), last.trigger.as_str(), last.action), ("FINAL", "FINAL", Action::Stop));

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].params, vec!["all".to_string()]);
    assert!(harness.outputs.load(&image, &GateName::new("DOCKERFILECHECK")).unwrap().is_some());
}

/// Verifies params of all rules for a gate are concatenated into one invocation.
#[test]
fn gate_params_are_accumulated_per_gate() {
    let harness = Harness::new();
    let mut policy = dockerfile_policy();
    policy.rules = vec![
        PolicyRule {
            params: vec![RuleParam {
                name: "blacklist".to_string(),
                value: "openssl,curl".to_string(),
            }],
            ..rule("PKGCHECK", "PKGBLACKLIST", Action::Stop)
        },
        rule("DOCKERFILECHECK", "NOFROM", Action::Stop),
        PolicyRule {
            params: vec![RuleParam {
                name: "fullmatch".to_string(),
                value: "bash".to_string(),
            }],
            ..rule("PKGCHECK", "PKGFULLMATCH", Action::Warn)
        },
    ];
    let runner = ScriptedRunner::default().with_output("PKGCHECK", "").with_output("DOCKERFILECHECK", "");
    let evaluation = evaluate_image_policy(&harness.context(&runner), &policy, &ImageId::new("img-1")).unwrap();
    assert_eq!(evaluation.verdict, Verdict::Go);

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].gate.as_str(), "PKGCHECK");
    assert_eq!(calls[0].params, vec!["blacklist=openssl,curl".to_string(), "fullmatch=bash".to_string()]);
    assert_eq!(calls[1].gate.as_str(), "DOCKERFILECHECK");
}

/// Verifies the first failing gate aborts the rest and yields no verdict.
#[test]
fn gate_failure_is_fail_fast() {
    let harness = Harness::new();
    let mut policy = dockerfile_policy();
    policy.rules.insert(0, rule("PKGCHECK", "PKGBLACKLIST", Action::Stop));
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "NOFROM x\n");
    let err = evaluate_image_policy(&harness.context(&runner), &policy, &ImageId::new("img-1")).unwrap_err();
    assert!(matches!(err, EvaluationError::GateExecutionFailed(GateError::ExitStatus { .. })));
    assert_eq!(runner.calls().len(), 1);
    assert!(harness.log.event_names().contains(&"gate_failed"));
}

/// Verifies repeated evaluations do not duplicate ledger entries.
#[test]
fn ledger_updates_are_idempotent() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "NOFROM No FROM line\n");
    let image = ImageId::new("img-1");
    let first = evaluate_image_policy(&harness.context(&runner), &dockerfile_policy(), &image).unwrap();
    let second = evaluate_image_policy(&harness.context(&runner), &dockerfile_policy(), &image).unwrap();
    assert_eq!(first.ledger_entries_added, 1);
    assert_eq!(second.ledger_entries_added, 0);
    let ledger = harness.ledger.load(&image).unwrap();
    assert_eq!(ledger.enforce.len(), 1);
    assert!(ledger.ignore.is_empty());
}

/// Verifies a promoted ledger entry suppresses the occurrence on the next run.
#[test]
fn promoted_ledger_entry_suppresses() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "NOFROM No FROM line\n");
    let image = ImageId::new("img-1");
    let first = evaluate_image_policy(&harness.context(&runner), &dockerfile_policy(), &image).unwrap();

    let mut promoted = ImageLedger::new();
    promoted.ignore.push(LedgerEntry::tracking(&first.active()[0]));
    harness.ledger.seed(&image, &promoted).unwrap();

    let second = evaluate_image_policy(&harness.context(&runner), &dockerfile_policy(), &image).unwrap();
    assert_eq!(second.verdict, Verdict::Go);
    assert_eq!(second.suppressed.len(), 1);
}

/// Verifies a ledger load failure is a warning and evaluation continues.
#[test]
fn ledger_load_failure_is_a_warning() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "NOFROM x\n");
    let broken = BrokenLedgerStore;
    let mut ctx = harness.context(&runner);
    ctx.ledger = &broken;
    let evaluation = evaluate_image_policy(&ctx, &dockerfile_policy(), &ImageId::new("img-1")).unwrap();
    assert_eq!(evaluation.verdict, Verdict::Stop);
    assert!(matches!(evaluation.warnings[0], EvaluationWarning::WhitelistLoadFailed { .. }));
    assert!(harness.log.event_names().contains(&"ledger_load_failed"));
}

/// Verifies malformed lines surface as warnings without failing the evaluation.
#[test]
fn malformed_output_is_reported() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "NOFROM\nNOFROM real finding\n");
    let evaluation =
        evaluate_image_policy(&harness.context(&runner), &dockerfile_policy(), &ImageId::new("img-1")).unwrap();
    assert_eq!(evaluation.verdict, Verdict::Stop);
    assert_eq!(evaluation.warnings.len(), 1);
    assert!(harness.log.event_names().contains(&"malformed_gate_output"));
}

/// Verifies stored output replays without running gates or touching the ledger.
#[test]
fn stored_output_replay_skips_gates() {
    let mut harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "NOFROM x\n");
    let image = ImageId::new("img-1");
    evaluate_image_policy(&harness.context(&runner), &dockerfile_policy(), &image).unwrap();

    harness.options.gate_source = GateSource::Stored;
    let replay_runner = ScriptedRunner::default();
    let replay = evaluate_image_policy(&harness.context(&replay_runner), &dockerfile_policy(), &image).unwrap();
    assert_eq!(replay.verdict, Verdict::Stop);
    assert_eq!(replay.gates_run, 0);
    assert!(replay_runner.calls().is_empty());

    let missing = evaluate_image_policy(&harness.context(&replay_runner), &dockerfile_policy(), &ImageId::new("other"))
        .unwrap_err();
    assert!(matches!(missing, EvaluationError::GateExecutionFailed(GateError::NotStored(_))));
}

// ============================================================================
// SECTION: Bundle Evaluation
// ============================================================================

/// Verifies tags resolving to the same policy and whitelists share one evaluation.
#[test]
fn identical_mappings_evaluate_once() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "NOFROM x\n");
    let bundle = bundle(
        vec![dockerfile_policy()],
        vec![
            mapping("latest", "dockerfile", "latest", &["wl-a", "wl-b"]),
            mapping("v2", "dockerfile", "v2", &["wl-b", "wl-a"]),
        ],
    );
    let tags = vec!["app:latest".to_string(), "app:v2".to_string()];
    let run = run_bundle(&harness.context(&runner), &bundle, &unaliased_record(), &tags, &[]).unwrap();

    assert_eq!(runner.calls().len(), 1);
    assert_eq!(run.gate_executions, 1);
    let first = run.tags[0].outcome.as_ref().unwrap();
    let second = run.tags[1].outcome.as_ref().unwrap();
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.evaluation, second.evaluation);
    assert_eq!(second.mapping_id.as_str(), "v2");
    assert_eq!(run.worst_verdict(), Some(Verdict::Stop));
    assert!(harness.log.event_names().contains(&"cache_hit"));
}

/// Verifies different whitelist sets are evaluated separately.
#[test]
fn different_whitelists_are_not_shared() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "NOFROM x\n");
    let bundle = bundle(
        vec![dockerfile_policy()],
        vec![mapping("latest", "dockerfile", "latest", &["wl-a"]), mapping("v2", "dockerfile", "v2", &["wl-b"])],
    );
    let tags = vec!["app:latest".to_string(), "app:v2".to_string()];
    let run = run_bundle(&harness.context(&runner), &bundle, &unaliased_record(), &tags, &[]).unwrap();
    assert_eq!(runner.calls().len(), 2);
    assert_eq!(run.gate_executions, 2);
}

/// Verifies bundle whitelists suppress occurrences for mapped tags.
#[test]
fn bundle_whitelist_applies_to_mapped_tag() {
    let harness = Harness::new();
    let policy = Policy {
        id: PolicyId::new("pkg"),
        name: "pkg".to_string(),
        version: "1".to_string(),
        rules: vec![rule("PKGCHECK", "PKGBLACKLIST", Action::Stop)],
    };
    let runner = ScriptedRunner::default().with_output("PKGCHECK", "PKGBLACKLIST {\"id\":\"openssl-1.0\"}\n");
    let bundle = bundle(vec![policy], vec![mapping("all", "pkg", "*", &["wl-a"])]);
    let run = run_bundle(&harness.context(&runner), &bundle, &record(), &["app:latest".to_string()], &[]).unwrap();
    let verdict = run.tags[0].outcome.as_ref().unwrap();
    assert_eq!(verdict.evaluation.verdict, Verdict::Go);
    assert_eq!(verdict.evaluation.suppressed.len(), 1);
}

/// Verifies an unmapped tag fails while other tags still evaluate.
#[test]
fn unmapped_tag_fails_closed() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "");
    let bundle = bundle(vec![dockerfile_policy()], vec![mapping("latest", "dockerfile", "latest", &[])]);
    let tags = vec!["quay.io/org/app:1".to_string(), "app:latest".to_string()];
    let run = run_bundle(&harness.context(&runner), &bundle, &record(), &tags, &[]).unwrap();
    assert!(matches!(
        run.tags[0].outcome,
        Err(EvaluationError::MappingNotFound(MappingError::NotFound { .. }))
    ));
    assert_eq!(run.tags[1].outcome.as_ref().unwrap().evaluation.verdict, Verdict::Go);
    assert!(run.has_errors());
    assert!(harness.log.event_names().contains(&"mapping_not_found"));
}

/// Verifies the recorded tags are used when none are requested.
#[test]
fn recorded_tags_are_default_targets() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "");
    let bundle = bundle(vec![dockerfile_policy()], vec![mapping("any", "dockerfile", "*", &[])]);
    let run = run_bundle(&harness.context(&runner), &bundle, &record(), &[], &[]).unwrap();
    assert_eq!(run.tags.len(), 2);

    let bare = ImageRecord::new(ImageId::new("bare"));
    let err = run_bundle(&harness.context(&runner), &bundle, &bare, &[], &[]).unwrap_err();
    assert!(matches!(err, EvaluationError::NoTags(_)));
}

/// Verifies an invalid bundle is rejected before any tag is resolved.
#[test]
fn invalid_bundle_is_never_evaluated() {
    let harness = Harness::new();
    let runner = ScriptedRunner::default();
    let bundle = bundle(vec![dockerfile_policy()], vec![mapping("any", "missing-policy", "*", &[])]);
    let err = run_bundle(&harness.context(&runner), &bundle, &record(), &[], &[]).unwrap_err();
    assert!(matches!(err, EvaluationError::BundleInvalid(_)));
    assert!(runner.calls().is_empty());
    assert!(harness.log.events().is_empty());
}

/// Verifies cancellation stops the run and never populates the cache.
#[test]
fn cancellation_skips_cache_population() {
    let harness = Harness::new();
    let mut runner = ScriptedRunner::default().with_output("DOCKERFILECHECK", "");
    runner.cancel_on = Some((GateName::new("DOCKERFILECHECK"), harness.cancel.clone()));
    let bundle = bundle(vec![dockerfile_policy()], vec![mapping("any", "dockerfile", "*", &[])]);
    let tags = vec!["app:latest".to_string(), "app:v2".to_string()];
    let run = run_bundle(&harness.context(&runner), &bundle, &record(), &tags, &[]).unwrap();

    assert!(matches!(run.tags[0].outcome, Err(EvaluationError::Cancelled)));
    assert!(matches!(run.tags[1].outcome, Err(EvaluationError::Cancelled)));
    assert_eq!(runner.calls().len(), 1);
    assert_eq!(run.worst_verdict(), None);
    let cancelled = harness.log.event_names().iter().filter(|name| **name == "evaluation_cancelled").count();
    assert_eq!(cancelled, 2);
}
