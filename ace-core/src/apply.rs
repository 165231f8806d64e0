//! Apply orchestrator — runs the full pipeline:
//!
//! analyze → filter → plan → pack → gate → budget → apply.
//!
//! Every stage may short-circuit to an empty result; the summary
//! records where and why. The apply stage itself is the only one that
//! touches the working tree, and every touch is journaled first.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::budget::{BudgetConstraints, BudgetSummary, apply_budget};
use crate::config::AceConfig;
use crate::error::{AceError, Result, StateError};
use crate::guard::Guard;
use crate::journal::Journal;
use crate::pack::{builtin_recipes, find_packs, synthesize_pack_plans};
use crate::patch::apply_edits;
use crate::policy::{GateOutcome, PolicyGate};
use crate::progress::ProgressReporter;
use crate::repair::{RepairStatus, isolate};
use crate::rules::{RefactorOutcome, RuleRegistry, Verification};
use crate::scan::{ScanStats, scan};
use crate::score::{plan_complexity, rstar};
use crate::skiplist::Skiplist;
use crate::suppress::parse_suppressions;
use crate::types::{Edit, EditPlan, Finding, Receipt, sha256_hex};

// ── State layout under .ace/ ───────────────────────────────────────

pub fn ace_dir(root: &Path) -> PathBuf {
    root.join(".ace")
}

pub fn config_path(root: &Path) -> PathBuf {
    ace_dir(root).join("config.toml")
}

pub fn journals_dir(root: &Path) -> PathBuf {
    ace_dir(root).join("journals")
}

pub fn receipts_dir(root: &Path) -> PathBuf {
    ace_dir(root).join("receipts")
}

pub fn skiplist_path(root: &Path) -> PathBuf {
    ace_dir(root).join("skiplist.json")
}

// ── Run options and summary ────────────────────────────────────────

/// Per-invocation knobs layered over the config.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Run the whole pipeline, including guard verification, without
    /// writing files, journal, or receipts.
    pub dry_run: bool,
    /// Skip pack synthesis; every plan stays individual.
    pub no_packs: bool,
    /// Override `[budget] max_files` for this run.
    pub max_files: Option<usize>,
    /// Override `[budget] max_lines` for this run.
    pub max_lines: Option<u64>,
}

/// Stage at which a run ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NoFindings,
    AllFindingsFiltered,
    NoPlans,
    NonePastGate,
    BudgetExhausted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoFindings => "no findings",
            Self::AllFindingsFiltered => "all findings suppressed or skiplisted",
            Self::NoPlans => "no plans could be synthesized",
            Self::NonePastGate => "no plans approved by policy",
            Self::BudgetExhausted => "budget excluded every approved plan",
        };
        f.write_str(text)
    }
}

/// A plan surfaced but not applied this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub plan_id: String,
    pub score: f64,
    pub rules: Vec<String>,
    pub files: Vec<PathBuf>,
    pub reason: String,
}

/// Full accounting for one apply run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<StopReason>,

    pub findings_total: usize,
    pub findings_suppressed: usize,
    pub findings_skiplisted: usize,
    pub detector_errors: usize,

    pub plans_generated: usize,
    pub refactor_failures: usize,
    pub packs_synthesized: usize,
    pub plans_approved: usize,
    pub plans_suggested: usize,
    pub plans_denied: usize,
    pub budget_excluded: usize,

    pub applied: usize,
    pub skipped_idempotent: usize,
    pub repaired: usize,
    pub reverted: usize,
    pub files_modified: usize,
    pub lines_modified: u64,

    pub suggestions: Vec<Suggestion>,
    pub receipts: Vec<Receipt>,
}

impl RunSummary {
    fn new(run_id: String, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            stopped_at: None,
            findings_total: 0,
            findings_suppressed: 0,
            findings_skiplisted: 0,
            detector_errors: 0,
            plans_generated: 0,
            refactor_failures: 0,
            packs_synthesized: 0,
            plans_approved: 0,
            plans_suggested: 0,
            plans_denied: 0,
            budget_excluded: 0,
            applied: 0,
            skipped_idempotent: 0,
            repaired: 0,
            reverted: 0,
            files_modified: 0,
            lines_modified: 0,
            suggestions: Vec::new(),
            receipts: Vec::new(),
        }
    }
}

// ── Check (detect-only path) ───────────────────────────────────────

/// Findings surviving the filter stage, plus filter accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub findings: Vec<Finding>,
    pub scan: ScanStats,
    pub suppressed: usize,
    pub skiplisted: usize,
}

/// Analyze and filter without planning or applying anything.
pub fn run_check(
    root: &Path,
    config: &AceConfig,
    registry: &RuleRegistry,
    reporter: &dyn ProgressReporter,
) -> Result<CheckReport> {
    let (findings, scan_stats) = scan(root, &config.scan, registry, reporter)?;
    let skiplist = Skiplist::load(&skiplist_path(root)).map_err(AceError::State)?;
    let (kept, suppressed, skiplisted) = filter_findings(findings, config, &skiplist);
    Ok(CheckReport {
        findings: kept,
        scan: scan_stats,
        suppressed,
        skiplisted,
    })
}

/// Drop suppressed and skiplisted findings, then cap at
/// `rules.max_findings`. Returns `(kept, suppressed, skiplisted)`.
fn filter_findings(
    findings: Vec<Finding>,
    config: &AceConfig,
    skiplist: &Skiplist,
) -> (Vec<Finding>, usize, usize) {
    let mut kept = Vec::new();
    let mut suppressed = 0;
    let mut skiplisted = 0;

    let mut current_file: Option<(PathBuf, crate::suppress::SuppressionSet)> = None;
    for finding in findings {
        // Findings arrive sorted by file, so one read per file suffices.
        if current_file.as_ref().is_none_or(|(f, _)| *f != finding.file) {
            let set = std::fs::read_to_string(&finding.file)
                .map(|src| parse_suppressions(&src))
                .unwrap_or_default();
            current_file = Some((finding.file.clone(), set));
        }
        let is_suppressed = current_file
            .as_ref()
            .is_some_and(|(_, set)| set.is_suppressed(finding.line, &finding.rule));

        if is_suppressed {
            suppressed += 1;
        } else if skiplist.is_skipped(&finding) {
            skiplisted += 1;
        } else {
            kept.push(finding);
        }
    }

    if kept.len() > config.rules.max_findings {
        tracing::warn!(
            total = kept.len(),
            cap = config.rules.max_findings,
            "finding cap reached; excess findings dropped this run"
        );
        kept.truncate(config.rules.max_findings);
    }
    (kept, suppressed, skiplisted)
}

// ── Plan synthesis ─────────────────────────────────────────────────

/// One individual plan per `(file, rule)` group with a successful
/// refactor. Returns `(plans, refactor_failures)`.
pub fn generate_plans(
    findings: &[Finding],
    config: &AceConfig,
    registry: &RuleRegistry,
) -> (Vec<EditPlan>, usize) {
    let mut plans = Vec::new();
    let mut failures = 0;

    // Findings are sorted by (file, line, rule); group by (file, rule).
    let mut groups: Vec<(&Path, &str, Vec<&Finding>)> = Vec::new();
    for finding in findings {
        match groups.last_mut() {
            Some((file, rule, members))
                if *file == finding.file.as_path() && *rule == finding.rule =>
            {
                members.push(finding);
            }
            _ => groups.push((finding.file.as_path(), finding.rule.as_str(), vec![finding])),
        }
    }

    for (file, rule_id, members) in groups {
        let Some(rule) = registry.get(rule_id) else {
            continue;
        };
        let source = match std::fs::read_to_string(file) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "unreadable during planning");
                failures += 1;
                continue;
            }
        };
        let owned: Vec<Finding> = members.into_iter().cloned().collect();
        match rule.refactor(&source, file, &owned) {
            RefactorOutcome::Changed(edits) => {
                if let Some(plan) = build_plan(owned, edits, rule_id, config) {
                    plans.push(plan);
                } else {
                    failures += 1;
                }
            }
            RefactorOutcome::Unchanged => {}
            RefactorOutcome::Failed(reason) => {
                tracing::warn!(file = %file.display(), rule = rule_id, %reason, "refactor failed");
                failures += 1;
            }
        }
    }
    (plans, failures)
}

fn build_plan(
    findings: Vec<Finding>,
    edits: Vec<Edit>,
    rule_id: &str,
    config: &AceConfig,
) -> Option<EditPlan> {
    if crate::types::find_overlap(&edits).is_some() {
        tracing::warn!(rule = rule_id, "rule emitted overlapping edits; plan dropped");
        return None;
    }
    let severity = findings
        .iter()
        .map(|f| f.severity.weight())
        .fold(0.0, f64::max);
    let lines: u64 = edits.iter().map(Edit::line_count).sum();
    let risk = rstar(
        severity,
        plan_complexity(lines),
        config.scoring.alpha,
        config.scoring.beta,
    );
    Some(EditPlan::new(
        findings,
        edits,
        vec!["python syntax remains valid".to_string()],
        risk,
    ))
}

/// A plan with its policy verdict, for `plan` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatedPlan {
    pub plan: EditPlan,
    pub outcome: GateOutcome,
}

/// Analyze, filter, plan, pack, and gate — everything up to (not
/// including) budget and apply. Shared by `plan` and `apply`.
pub fn run_plan(
    root: &Path,
    config: &AceConfig,
    registry: &RuleRegistry,
    no_packs: bool,
    reporter: &dyn ProgressReporter,
) -> Result<(Vec<GatedPlan>, CheckReport, usize, usize)> {
    let report = run_check(root, config, registry, reporter)?;
    let (individual, failures) = generate_plans(&report.findings, config, registry);

    let (plans, packs_synthesized) = if config.packs.enabled && !no_packs {
        let packs = find_packs(&report.findings, &builtin_recipes(), config.packs.min_findings);
        let (mut pack_plans, fallback) = synthesize_pack_plans(&packs, &individual);
        let count = pack_plans.len();
        pack_plans.extend(fallback);
        (pack_plans, count)
    } else {
        (individual, 0)
    };

    let gate = PolicyGate::new(&config.scoring, &config.rules, registry);
    let gated = plans
        .into_iter()
        .map(|plan| {
            let outcome = gate.evaluate(&plan);
            GatedPlan { plan, outcome }
        })
        .collect();
    Ok((gated, report, failures, packs_synthesized))
}

// ── Apply ──────────────────────────────────────────────────────────

/// Run the full pipeline against `root`.
pub fn run_apply(
    root: &Path,
    config: &AceConfig,
    registry: &RuleRegistry,
    options: &ApplyOptions,
    reporter: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4().to_string();
    let mut summary = RunSummary::new(run_id.clone(), options.dry_run);

    let (gated, report, refactor_failures, packs_synthesized) =
        run_plan(root, config, registry, options.no_packs, reporter)?;
    summary.findings_total = report.findings.len() + report.suppressed + report.skiplisted;
    summary.findings_suppressed = report.suppressed;
    summary.findings_skiplisted = report.skiplisted;
    summary.detector_errors = report.scan.detector_errors.len();
    summary.refactor_failures = refactor_failures;
    summary.packs_synthesized = packs_synthesized;
    summary.plans_generated = gated.len();

    if summary.findings_total == 0 {
        summary.stopped_at = Some(StopReason::NoFindings);
        return Ok(summary);
    }
    if report.findings.is_empty() {
        summary.stopped_at = Some(StopReason::AllFindingsFiltered);
        return Ok(summary);
    }
    if gated.is_empty() {
        summary.stopped_at = Some(StopReason::NoPlans);
        return Ok(summary);
    }

    let mut approved = Vec::new();
    for GatedPlan { plan, outcome } in gated {
        match outcome {
            GateOutcome::Approved { .. } => {
                summary.plans_approved += 1;
                approved.push(plan);
            }
            GateOutcome::Suggested { score } => {
                summary.plans_suggested += 1;
                summary.suggestions.push(Suggestion {
                    plan_id: plan.id.clone(),
                    score,
                    rules: plan.rules().iter().map(ToString::to_string).collect(),
                    files: plan.files().into_iter().map(PathBuf::from).collect(),
                    reason: "below auto threshold or detect-only rule".to_string(),
                });
            }
            GateOutcome::Denied { .. } => summary.plans_denied += 1,
        }
    }
    if approved.is_empty() {
        summary.stopped_at = Some(StopReason::NonePastGate);
        return Ok(summary);
    }

    let constraints = BudgetConstraints {
        max_files: options.max_files.or(config.budget.max_files),
        max_lines: options.max_lines.or(config.budget.max_lines),
    };
    let (budgeted, budget_summary): (Vec<EditPlan>, BudgetSummary) =
        apply_budget(approved, &constraints, &config.scoring);
    summary.budget_excluded = budget_summary.excluded_count;
    if budgeted.is_empty() {
        summary.stopped_at = Some(StopReason::BudgetExhausted);
        return Ok(summary);
    }

    apply_plans(root, &run_id, &budgeted, registry, options, reporter, &mut summary)?;
    Ok(summary)
}

#[allow(clippy::too_many_lines)]
fn apply_plans(
    root: &Path,
    run_id: &str,
    plans: &[EditPlan],
    registry: &RuleRegistry,
    options: &ApplyOptions,
    reporter: &dyn ProgressReporter,
    summary: &mut RunSummary,
) -> Result<()> {
    let mut guard = Guard::new()?;
    let prior_receipts = load_all_receipts(root)?;
    let mut journal = if options.dry_run {
        None
    } else {
        Some(Journal::create(&journals_dir(root), run_id)?)
    };
    let mut files_modified: BTreeSet<PathBuf> = BTreeSet::new();

    reporter.start("applying", Some(plans.len() as u64));
    for plan in plans {
        let strict = matches!(
            registry.plan_verification(plan.rules().iter().copied()),
            Verification::Strict
        );
        let rule_ids: Vec<String> = plan.rules().iter().map(ToString::to_string).collect();

        for file in plan.files() {
            let started = Instant::now();
            let file_edits: Vec<Edit> = plan
                .edits
                .iter()
                .filter(|e| e.file.as_path() == file)
                .cloned()
                .collect();
            let before = match std::fs::read_to_string(file) {
                Ok(before) => before,
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "vanished before apply");
                    continue;
                }
            };
            let before_hash = sha256_hex(before.as_bytes());

            // Idempotency: this exact plan already ran against this
            // exact content.
            if prior_receipts
                .iter()
                .any(|r| r.plan_id == plan.id && r.before_hash == before_hash)
            {
                tracing::info!(file = %file.display(), plan = %plan.id, "already applied; no-op");
                summary.skipped_idempotent += 1;
                continue;
            }

            let candidate = match apply_edits(&before, &file_edits) {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "edits no longer apply");
                    summary.reverted += 1;
                    continue;
                }
            };

            if let Some(journal) = journal.as_mut() {
                journal.log_intent(file, &before, rule_ids.clone(), &plan.id)?;
                std::fs::write(file, &candidate)
                    .map_err(|e| AceError::State(StateError::Io(e)))?;
            }

            let verdict = guard.verify(file, &before, &candidate, strict)?;
            let (final_content, lines_applied, repaired) = if verdict.passed {
                let lines = file_edits.iter().map(Edit::line_count).sum::<u64>();
                (candidate, lines, false)
            } else {
                let report = isolate(&mut guard, file, &before, &file_edits, strict)?;
                match report.status {
                    RepairStatus::Partial => {
                        tracing::info!(
                            file = %file.display(),
                            safe = report.safe_indices.len(),
                            failed = report.failed_indices.len(),
                            "guard failed; repair salvaged a subset"
                        );
                        // Only the salvaged edits count toward the
                        // line budget and run totals.
                        let lines = report
                            .safe_indices
                            .iter()
                            .map(|&i| file_edits[i].line_count())
                            .sum::<u64>();
                        let content = report
                            .repaired_content
                            .unwrap_or_else(|| before.clone());
                        (content, lines, true)
                    }
                    RepairStatus::Clean
                    | RepairStatus::Irreparable
                    | RepairStatus::BinarySearchError => {
                        let reason = report
                            .failure_reason
                            .unwrap_or_else(|| "verification failed".to_string());
                        tracing::warn!(
                            file = %file.display(),
                            status = ?report.status,
                            %reason,
                            "edit reverted"
                        );
                        if let Some(journal) = journal.as_mut() {
                            std::fs::write(file, &before)
                                .map_err(|e| AceError::State(StateError::Io(e)))?;
                            journal.log_revert(
                                file,
                                &sha256_hex(candidate.as_bytes()),
                                &before_hash,
                                &reason,
                            )?;
                        }
                        summary.reverted += 1;
                        reporter.advance(1);
                        continue;
                    }
                }
            };

            let after_hash = sha256_hex(final_content.as_bytes());
            if let Some(journal) = journal.as_mut() {
                std::fs::write(file, &final_content)
                    .map_err(|e| AceError::State(StateError::Io(e)))?;
                journal.log_success(file, &final_content, &plan.id)?;
            }

            summary.applied += 1;
            if repaired {
                summary.repaired += 1;
            }
            files_modified.insert(file.to_path_buf());
            summary.lines_modified += lines_applied;
            summary.receipts.push(Receipt {
                plan_id: plan.id.clone(),
                file: file.to_path_buf(),
                before_hash,
                after_hash,
                parse_valid: true,
                invariants_met: !repaired,
                estimated_risk: plan.estimated_risk,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
        }
        reporter.advance(1);
    }
    reporter.finish();

    summary.files_modified = files_modified.len();
    if !options.dry_run && !summary.receipts.is_empty() {
        save_receipts(root, run_id, &summary.receipts)?;
    }
    Ok(())
}

// ── Receipts persistence ───────────────────────────────────────────

fn save_receipts(root: &Path, run_id: &str, receipts: &[Receipt]) -> Result<()> {
    let dir = receipts_dir(root);
    std::fs::create_dir_all(&dir).map_err(|e| AceError::State(StateError::Io(e)))?;
    let mut text =
        serde_json::to_string_pretty(receipts).map_err(|e| AceError::State(e.into()))?;
    text.push('\n');
    std::fs::write(dir.join(format!("{run_id}.json")), text)
        .map_err(|e| AceError::State(StateError::Io(e)))?;
    Ok(())
}

/// Every receipt from every prior run, for idempotency checks and
/// `status` output.
pub fn load_all_receipts(root: &Path) -> Result<Vec<Receipt>> {
    let dir = receipts_dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut receipts = Vec::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)
        .map_err(|e| AceError::State(StateError::Io(e)))?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort_unstable();
    for path in entries {
        let text =
            std::fs::read_to_string(&path).map_err(|e| AceError::State(StateError::Io(e)))?;
        let batch: Vec<Receipt> =
            serde_json::from_str(&text).map_err(|e| AceError::State(e.into()))?;
        receipts.extend(batch);
    }
    Ok(receipts)
}

// ── Tests ──────────────────────────────────────────────────────────
