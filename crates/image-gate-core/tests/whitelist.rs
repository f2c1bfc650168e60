// crates/image-gate-core/tests/whitelist.rs
// ============================================================================
// Module: Whitelist Filter Tests
// Description: Tests for ledger and global whitelist suppression.
// Purpose: Validate suppression order, wildcards, and compatibility switches.
// ============================================================================

//! Whitelist filter tests.

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

use image_gate_core::Action;
use image_gate_core::GateName;
use image_gate_core::ImageId;
use image_gate_core::ImageLedger;
use image_gate_core::LedgerEntry;
use image_gate_core::TriggerId;
use image_gate_core::TriggerName;
use image_gate_core::TriggerOccurrence;
use image_gate_core::Whitelist;
use image_gate_core::WhitelistId;
use image_gate_core::WhitelistItem;
use image_gate_core::WhitelistSource;
use image_gate_core::runtime::GlobalWhitelist;
use image_gate_core::runtime::GlobalWhitelistEntry;
use image_gate_core::runtime::WhitelistCompat;
use image_gate_core::runtime::aggregate;
use image_gate_core::runtime::filter_occurrences;
use image_gate_core::runtime::whitelist::pending_ledger_entries;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn occurrence(gate: &str, trigger: &str, trigger_id: &str, action: Action) -> TriggerOccurrence {
    TriggerOccurrence {
        image_id: ImageId::new("img"),
        gate: GateName::new(gate),
        trigger: TriggerName::new(trigger),
        trigger_id: TriggerId::new(trigger_id),
        message: format!("{trigger_id} found"),
        action,
    }
}

fn global(entries: &[(&str, &str)]) -> GlobalWhitelist {
    GlobalWhitelist::from_entries(
        entries
            .iter()
            .map(|(gate, trigger_id)| GlobalWhitelistEntry {
                gate: GateName::new(gate),
                trigger_id: (*trigger_id).to_string(),
                whitelist_id: None,
            })
            .collect(),
    )
}

// ============================================================================
// SECTION: Global Whitelist
// ============================================================================

/// Verifies a trailing wildcard suppresses matching trigger ids.
#[test]
fn wildcard_entry_suppresses_prefix_matches() {
    let occurrences = vec![
        occurrence("PKGCHECK", "PKGBLACKLIST", "openssl-1.0", Action::Stop),
        occurrence("PKGCHECK", "PKGBLACKLIST", "curl-7", Action::Warn),
    ];
    let outcome = filter_occurrences(
        occurrences,
        &ImageLedger::new(),
        &global(&[("PKGCHECK", "openssl-*")]),
        WhitelistCompat::default(),
    )
    .unwrap();
    assert_eq!(outcome.suppressed.len(), 1);
    assert_eq!(outcome.suppressed[0].occurrence.trigger_id.as_str(), "openssl-1.0");
    assert_eq!(
        outcome.suppressed[0].source,
        WhitelistSource::Global {
            whitelist_id: None,
            pattern: "openssl-*".to_string(),
        }
    );
    assert_eq!(aggregate(&outcome.active), image_gate_core::Verdict::Warn);
}

/// Verifies entries only apply to their own gate.
#[test]
fn entries_are_scoped_to_their_gate() {
    let outcome = filter_occurrences(
        vec![occurrence("PKGCHECK", "PKGBLACKLIST", "openssl-1.0", Action::Stop)],
        &ImageLedger::new(),
        &global(&[("ANCHORESEC", "*")]),
        WhitelistCompat::default(),
    )
    .unwrap();
    assert_eq!(outcome.active.len(), 1);
}

/// Verifies bundle whitelist entries carry their whitelist id.
#[test]
fn bundle_whitelist_source_is_reported() {
    let mut whitelist = GlobalWhitelist::new();
    whitelist.extend_from_bundle(&Whitelist {
        id: WhitelistId::new("wl-1"),
        name: "wl".to_string(),
        version: "1".to_string(),
        items: vec![WhitelistItem {
            gate: GateName::new("pkgcheck"),
            trigger_id: "curl-7".to_string(),
        }],
    });
    let outcome = filter_occurrences(
        vec![occurrence("PKGCHECK", "PKGBLACKLIST", "curl-7", Action::Stop)],
        &ImageLedger::new(),
        &whitelist,
        WhitelistCompat::default(),
    )
    .unwrap();
    assert_eq!(
        outcome.suppressed[0].source,
        WhitelistSource::Global {
            whitelist_id: Some(WhitelistId::new("wl-1")),
            pattern: "curl-7".to_string(),
        }
    );
}

// ============================================================================
// SECTION: Advisory Prefix Compatibility
// ============================================================================

/// Verifies bare advisory ids for the advisory gate prefix-match when enabled.
#[test]
fn bare_advisory_entry_prefix_matches_with_compat() {
    let occurrences = vec![occurrence("ANCHORESEC", "VULNHIGH", "CVE-2016-2108+openssl", Action::Stop)];
    let entries = global(&[("ANCHORESEC", "CVE-2016-2108")]);

    let outcome = filter_occurrences(occurrences.clone(), &ImageLedger::new(), &entries, WhitelistCompat::default())
        .unwrap();
    assert!(outcome.active.is_empty());
    assert!(matches!(outcome.suppressed[0].source, WhitelistSource::AdvisoryPrefixCompat { .. }));

    let strict = WhitelistCompat {
        cve_prefix_whitelist: false,
        legacy_ledger_records: true,
    };
    let outcome = filter_occurrences(occurrences, &ImageLedger::new(), &entries, strict).unwrap();
    assert_eq!(outcome.active.len(), 1);
}

/// Verifies the compatibility rule ignores other gates and non-advisory ids.
#[test]
fn advisory_compat_is_narrow() {
    let compat = WhitelistCompat::default();
    let other_gate = filter_occurrences(
        vec![occurrence("PKGCHECK", "PKGBLACKLIST", "CVE-2016-2108+openssl", Action::Stop)],
        &ImageLedger::new(),
        &global(&[("PKGCHECK", "CVE-2016-2108")]),
        compat,
    )
    .unwrap();
    assert_eq!(other_gate.active.len(), 1);

    let not_advisory = filter_occurrences(
        vec![occurrence("ANCHORESEC", "VULNHIGH", "openssl-1.0", Action::Stop)],
        &ImageLedger::new(),
        &global(&[("ANCHORESEC", "openssl")]),
        compat,
    )
    .unwrap();
    assert_eq!(not_advisory.active.len(), 1);
}

// ============================================================================
// SECTION: Image Ledger
// ============================================================================

/// Verifies the ledger ignore partition is checked before global entries.
#[test]
fn ledger_ignore_wins_over_global() {
    let occ = occurrence("PKGCHECK", "PKGBLACKLIST", "openssl-1.0", Action::Stop);
    let mut ledger = ImageLedger::new();
    ledger.ignore.push(LedgerEntry::tracking(&occ));
    let outcome = filter_occurrences(
        vec![occ],
        &ledger,
        &global(&[("PKGCHECK", "openssl-*")]),
        WhitelistCompat::default(),
    )
    .unwrap();
    assert_eq!(outcome.suppressed[0].source, WhitelistSource::ImageLedger);
}

/// Verifies enforce entries do not suppress.
#[test]
fn ledger_enforce_entries_stay_active() {
    let occ = occurrence("PKGCHECK", "PKGBLACKLIST", "openssl-1.0", Action::Stop);
    let mut ledger = ImageLedger::new();
    ledger.enforce.push(LedgerEntry::tracking(&occ));
    let outcome =
        filter_occurrences(vec![occ], &ledger, &GlobalWhitelist::new(), WhitelistCompat::default()).unwrap();
    assert_eq!(outcome.active.len(), 1);
    assert!(pending_ledger_entries(&outcome.active, &ledger, true).is_empty());
}

/// Verifies legacy full-record ledger entries match only with the switch on.
#[test]
fn legacy_full_record_entries_need_compat() {
    let occ = occurrence("PKGCHECK", "PKGBLACKLIST", "openssl-1.0", Action::Stop);
    let mut ledger = ImageLedger::new();
    ledger.ignore.push(LedgerEntry {
        gate: occ.gate.clone(),
        trigger_id: None,
        trigger: Some(occ.trigger.clone()),
        message: Some(occ.message.clone()),
        image_id: Some(occ.image_id.clone()),
    });

    let legacy = filter_occurrences(vec![occ.clone()], &ledger, &GlobalWhitelist::new(), WhitelistCompat::default())
        .unwrap();
    assert!(legacy.active.is_empty());

    let strict = WhitelistCompat {
        cve_prefix_whitelist: true,
        legacy_ledger_records: false,
    };
    let outcome = filter_occurrences(vec![occ], &ledger, &GlobalWhitelist::new(), strict).unwrap();
    assert_eq!(outcome.active.len(), 1);
}

/// Verifies pending entries are deduplicated and skip tracked occurrences.
#[test]
fn pending_entries_are_unique() {
    let first = occurrence("PKGCHECK", "PKGBLACKLIST", "openssl-1.0", Action::Stop);
    let tracked = occurrence("PKGCHECK", "PKGBLACKLIST", "curl-7", Action::Stop);
    let mut ledger = ImageLedger::new();
    ledger.enforce.push(LedgerEntry::tracking(&tracked));
    let pending = pending_ledger_entries(&[first.clone(), first, tracked], &ledger, true);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].trigger_id.as_ref().unwrap().as_str(), "openssl-1.0");
}
