use ace_core::apply::{
    ApplyOptions, StopReason, journals_dir, load_all_receipts, run_check, skiplist_path,
};
use ace_core::journal::{JournalRecord, build_revert_plan, read_journal};
use ace_core::progress::NoopReporter;
use ace_core::rules::RuleRegistry;
use ace_core::skiplist::Skiplist;
use ace_core::types::sha256_hex;

use ace_test::{TestProject, run_full, run_with_options};

// ── Detect-only path ─────────────────────────────────────────────

#[test]
fn check_finds_and_filters_findings() {
    let project = TestProject::messy_python();
    project.init(0.2, 0.1);

    let report = run_check(
        project.path(),
        &project.config(),
        &RuleRegistry::builtin(),
        &NoopReporter,
    )
    .unwrap();

    assert_eq!(report.scan.files_scanned, 3, "README.md never scanned");
    assert_eq!(report.suppressed, 1, "legacy.py bare except is suppressed");
    assert_eq!(report.findings.len(), 4);

    let rules: Vec<&str> = report.findings.iter().map(|f| f.rule.as_str()).collect();
    assert!(rules.contains(&"trailing-whitespace"));
    assert!(rules.contains(&"bare-except"));
    assert!(rules.contains(&"mutable-default-arg"));

    // Deterministic ordering by (file, line, rule).
    let sorted = report
        .findings
        .windows(2)
        .all(|w| (&w[0].file, w[0].line) <= (&w[1].file, w[1].line));
    assert!(sorted);
}

// ── Full pipeline ────────────────────────────────────────────────

#[test]
fn apply_fixes_files_and_persists_artifacts() {
    let project = TestProject::messy_python();
    project.init(0.2, 0.1);

    let summary = run_full(&project).unwrap();
    assert!(summary.applied >= 2);
    assert!(summary.stopped_at.is_none());
    assert!(summary.packs_synthesized >= 1, "api.py matches file-hygiene");

    let api = project.read("app/api.py");
    assert!(api.contains("except Exception:"));
    assert!(!api.contains("import json   "));
    let util = project.read("app/util.py");
    assert!(!util.contains("   \n"));
    // Detect-only rule leaves the mutable default untouched.
    assert!(util.contains("extra={}"));
    // Suppressed handler survives.
    assert!(project.read("app/legacy.py").contains("except:  #"));

    // Journal: every success is preceded by its intent.
    let journal_path = journals_dir(project.path()).join(format!("{}.jsonl", summary.run_id));
    let records = read_journal(&journal_path).unwrap();
    assert!(!records.is_empty());
    let mut pending = 0i32;
    for record in &records {
        match record {
            JournalRecord::Intent { .. } => pending += 1,
            JournalRecord::Success { .. } | JournalRecord::Revert { .. } => pending -= 1,
        }
        assert!(pending >= 0, "success or revert without a prior intent");
    }

    // Receipts: raw hex hashes, consistent with the summary.
    let receipts = load_all_receipts(project.path()).unwrap();
    assert_eq!(receipts.len(), summary.receipts.len());
    for receipt in &receipts {
        assert_eq!(receipt.before_hash.len(), 64);
        assert_eq!(receipt.after_hash.len(), 64);
        assert!(receipt.parse_valid);
    }
}

#[test]
fn revert_restores_original_content() {
    let project = TestProject::messy_python();
    project.init(0.2, 0.1);

    let original_api = project.read("app/api.py");
    let original_util = project.read("app/util.py");

    let summary = run_full(&project).unwrap();
    assert!(summary.applied >= 2);
    assert_ne!(project.read("app/api.py"), original_api);

    let journal_path = journals_dir(project.path()).join(format!("{}.jsonl", summary.run_id));
    let plan = build_revert_plan(&journal_path).unwrap();
    assert!(plan.incomplete.is_empty());
    assert_eq!(plan.contexts.len(), summary.applied);

    for ctx in &plan.contexts {
        ctx.restore().unwrap();
    }

    assert_eq!(project.read("app/api.py"), original_api);
    assert_eq!(project.read("app/util.py"), original_util);
    assert_eq!(
        sha256_hex(project.read("app/api.py").as_bytes()),
        plan.contexts
            .iter()
            .find(|c| c.file.ends_with("api.py"))
            .unwrap()
            .original_sha
    );
}

#[test]
fn second_apply_is_a_no_op() {
    let project = TestProject::messy_python();
    project.init(0.2, 0.1);

    let first = run_full(&project).unwrap();
    assert!(first.applied >= 2);
    let fixed_api = project.read("app/api.py");

    // Fixed findings are gone; only the detect-only rule still fires,
    // and it synthesizes no plan.
    let second = run_full(&project).unwrap();
    assert_eq!(second.applied, 0);
    assert_eq!(second.stopped_at, Some(StopReason::NoPlans));
    assert_eq!(project.read("app/api.py"), fixed_api);
}

#[test]
fn receipts_short_circuit_a_replayed_input() {
    let project = TestProject::messy_python();
    project.init(0.2, 0.1);

    let original_api = project.read("app/api.py");
    let first = run_full(&project).unwrap();
    assert!(first.applied >= 1);

    // Restore the original bytes; the receipts remember this exact
    // (plan, before-hash) pair and skip it.
    project.write("app/api.py", &original_api);
    let second = run_full(&project).unwrap();
    assert!(second.skipped_idempotent >= 1);
    assert_eq!(project.read("app/api.py"), original_api);
}

#[test]
fn budget_caps_bound_the_run() {
    let project = TestProject::messy_python();
    project.init(0.2, 0.1);

    let options = ApplyOptions {
        max_files: Some(1),
        ..ApplyOptions::default()
    };
    let summary = run_with_options(&project, &options).unwrap();
    assert_eq!(summary.files_modified, 1);
    assert!(summary.budget_excluded >= 1);
    // The higher-scoring pack plan wins the single file slot.
    assert!(project.read("app/api.py").contains("except Exception:"));
    assert!(project.read("app/util.py").contains("   \n"));
}

#[test]
fn skiplist_excludes_dismissed_findings_end_to_end() {
    let project = TestProject::messy_python();
    project.init(0.2, 0.1);

    let report = run_check(
        project.path(),
        &project.config(),
        &RuleRegistry::builtin(),
        &NoopReporter,
    )
    .unwrap();
    let bare = report
        .findings
        .iter()
        .find(|f| f.rule == "bare-except")
        .unwrap();

    let mut skiplist = Skiplist::default();
    skiplist.record(bare, "reviewed; the broad handler is intentional");
    skiplist.save(&skiplist_path(project.path())).unwrap();

    let summary = run_full(&project).unwrap();
    assert_eq!(summary.findings_skiplisted, 1);
    assert!(project.read("app/api.py").contains("except:"), "fix withheld");
}

#[test]
fn conservative_thresholds_only_suggest() {
    let project = TestProject::messy_python();
    // Stock thresholds: 0.70 auto, 0.50 suggest.
    project.init(0.70, 0.50);

    let original_api = project.read("app/api.py");
    let summary = run_full(&project).unwrap();
    assert_eq!(summary.applied, 0);
    assert_eq!(summary.stopped_at, Some(StopReason::NonePastGate));
    assert!(summary.plans_suggested >= 1);
    assert_eq!(project.read("app/api.py"), original_api);
}
