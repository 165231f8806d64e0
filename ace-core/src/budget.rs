//! Budget enforcement — deterministic greedy selection of edit plans
//! under file and line caps.
//!
//! This is a single-pass policy by design: plans are ranked by
//! `(-score, first_file_path)` and walked once; a plan that would
//! violate either cap is excluded and never retried. Predictability
//! over knapsack optimality.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{BudgetSection, ScoringSection};
use crate::score::effective_score;
use crate::types::EditPlan;

/// Caps for one run; either may be unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BudgetConstraints {
    pub max_files: Option<usize>,
    pub max_lines: Option<u64>,
}

impl From<&BudgetSection> for BudgetConstraints {
    fn from(section: &BudgetSection) -> Self {
        Self {
            max_files: section.max_files,
            max_lines: section.max_lines,
        }
    }
}

/// What the single selection pass included and excluded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub included_count: usize,
    pub excluded_count: usize,
    pub included_files: BTreeSet<PathBuf>,
    pub excluded_files: BTreeSet<PathBuf>,
    pub lines_applied: u64,
    pub lines_skipped: u64,
}

/// Select a deterministic maximal prefix-greedy subset of plans within
/// budget. Returns the included plans in ranked order plus a summary
/// derived from the same pass.
pub fn apply_budget(
    plans: Vec<EditPlan>,
    constraints: &BudgetConstraints,
    scoring: &ScoringSection,
) -> (Vec<EditPlan>, BudgetSummary) {
    let mut ranked: Vec<(f64, PathBuf, EditPlan)> = plans
        .into_iter()
        .map(|plan| {
            let score = effective_score(&plan, scoring);
            let first_file = plan
                .files()
                .first()
                .map(|p| p.to_path_buf())
                .unwrap_or_default();
            (score, first_file, plan)
        })
        .collect();

    // Highest score first; path breaks ties for full determinism.
    ranked.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });

    let mut included = Vec::new();
    let mut summary = BudgetSummary::default();
    let mut files_seen: BTreeSet<PathBuf> = BTreeSet::new();
    let mut total_lines: u64 = 0;

    for (_, _, plan) in ranked {
        let plan_files: BTreeSet<PathBuf> =
            plan.files().into_iter().map(PathBuf::from).collect();
        let plan_lines = plan.line_count();

        let merged_files = files_seen.union(&plan_files).count();
        let fits_files = constraints.max_files.is_none_or(|cap| merged_files <= cap);
        let fits_lines = constraints
            .max_lines
            .is_none_or(|cap| total_lines + plan_lines <= cap);

        if fits_files && fits_lines {
            files_seen.extend(plan_files.iter().cloned());
            total_lines += plan_lines;
            summary.included_count += 1;
            summary.lines_applied += plan_lines;
            summary.included_files.extend(plan_files);
            included.push(plan);
        } else {
            summary.excluded_count += 1;
            summary.lines_skipped += plan_lines;
            summary.excluded_files.extend(plan_files);
        }
    }

    (included, summary)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Edit, Finding, Severity};

    fn plan(file: &str, start: u32, end: u32, risk: f64) -> EditPlan {
        let finding = Finding::new(file, start, "r", Severity::Medium, format!("{file}:{start}"));
        let edit = Edit::replace(file, start, end, "x").unwrap();
        EditPlan::new(vec![finding], vec![edit], vec![], risk)
    }

    fn scoring() -> ScoringSection {
        ScoringSection::default()
    }

    #[test]
    fn unbounded_budget_includes_everything() {
        let plans = vec![plan("a.py", 1, 3, 0.9), plan("b.py", 1, 1, 0.1)];
        let (included, summary) = apply_budget(plans, &BudgetConstraints::default(), &scoring());
        assert_eq!(included.len(), 2);
        assert_eq!(summary.excluded_count, 0);
        assert_eq!(summary.lines_applied, 4);
    }

    #[test]
    fn max_files_keeps_highest_scored_plan() {
        // a.py at 0.5 and b.py at 0.1 with max_files=1.
        let plans = vec![plan("b.py", 1, 1, 0.1), plan("a.py", 1, 1, 0.5)];
        let constraints = BudgetConstraints {
            max_files: Some(1),
            max_lines: None,
        };
        let (included, summary) = apply_budget(plans, &constraints, &scoring());
        assert_eq!(included.len(), 1);
        assert_eq!(included[0].files().first().unwrap().to_str(), Some("a.py"));
        assert_eq!(summary.excluded_count, 1);
        assert!(summary.excluded_files.contains(&PathBuf::from("b.py")));
    }

    #[test]
    fn max_lines_is_never_exceeded() {
        let plans = vec![
            plan("a.py", 1, 5, 0.9),  // 5 lines
            plan("b.py", 1, 4, 0.8),  // 4 lines
            plan("c.py", 1, 1, 0.7),  // 1 line
        ];
        let constraints = BudgetConstraints {
            max_files: None,
            max_lines: Some(6),
        };
        let (included, summary) = apply_budget(plans, &constraints, &scoring());
        // Greedy: a.py (5) fits, b.py (4) would exceed, c.py (1) fits.
        assert_eq!(included.len(), 2);
        assert!(summary.lines_applied <= 6);
        assert_eq!(summary.lines_applied, 6);
        assert_eq!(summary.lines_skipped, 4);
    }

    #[test]
    fn no_backtracking_after_exclusion() {
        let plans = vec![plan("a.py", 1, 5, 0.9), plan("b.py", 1, 5, 0.8)];
        let constraints = BudgetConstraints {
            max_files: None,
            max_lines: Some(5),
        };
        let (included, _) = apply_budget(plans, &constraints, &scoring());
        assert_eq!(included.len(), 1);
        assert_eq!(included[0].files().first().unwrap().to_str(), Some("a.py"));
    }

    #[test]
    fn ties_break_by_path() {
        let plans = vec![plan("z.py", 1, 1, 0.5), plan("a.py", 1, 1, 0.5)];
        let (included, _) = apply_budget(plans, &BudgetConstraints::default(), &scoring());
        assert_eq!(included[0].files().first().unwrap().to_str(), Some("a.py"));
    }

    #[test]
    fn shared_files_count_once() {
        let plans = vec![plan("a.py", 1, 1, 0.9), plan("a.py", 5, 5, 0.8)];
        let constraints = BudgetConstraints {
            max_files: Some(1),
            max_lines: None,
        };
        let (included, summary) = apply_budget(plans, &constraints, &scoring());
        assert_eq!(included.len(), 2);
        assert_eq!(summary.included_files.len(), 1);
    }

    #[test]
    fn cohesion_bonus_affects_ranking() {
        let mut boosted = plan("b.py", 1, 1, 0.5);
        boosted.cohesion = Some(1.0);
        let plains = plan("a.py", 1, 1, 0.5);
        let constraints = BudgetConstraints {
            max_files: Some(1),
            max_lines: None,
        };
        let (included, _) = apply_budget(vec![plains, boosted], &constraints, &scoring());
        assert_eq!(included.len(), 1);
        assert_eq!(included[0].files().first().unwrap().to_str(), Some("b.py"));
    }

    #[test]
    fn determinism_across_runs() {
        let make = || {
            vec![
                plan("c.py", 1, 2, 0.6),
                plan("a.py", 1, 2, 0.6),
                plan("b.py", 1, 2, 0.3),
            ]
        };
        let constraints = BudgetConstraints {
            max_files: Some(2),
            max_lines: None,
        };
        let run = || {
            let (included, summary) = apply_budget(make(), &constraints, &scoring());
            (
                included.iter().map(|p| p.id.clone()).collect::<Vec<_>>(),
                serde_json::to_string(&summary).unwrap(),
            )
        };
        assert_eq!(run(), run());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn caps_always_respected(
                specs in proptest::collection::vec(
                    (0u8..6, 1u32..30, 0u32..5, 0.0f64..1.0),
                    0..12,
                ),
                max_files in proptest::option::of(1usize..4),
                max_lines in proptest::option::of(1u64..40),
            ) {
                let plans: Vec<EditPlan> = specs
                    .iter()
                    .map(|(f, start, len, risk)| {
                        plan(&format!("f{f}.py"), *start, start + len, *risk)
                    })
                    .collect();
                let constraints = BudgetConstraints { max_files, max_lines };
                let (included, summary) =
                    apply_budget(plans, &constraints, &ScoringSection::default());

                if let Some(cap) = max_files {
                    prop_assert!(summary.included_files.len() <= cap);
                }
                if let Some(cap) = max_lines {
                    prop_assert!(summary.lines_applied <= cap);
                }
                let recount: u64 = included.iter().map(EditPlan::line_count).sum();
                prop_assert_eq!(recount, summary.lines_applied);
                prop_assert_eq!(included.len(), summary.included_count);
            }
        }
    }
}
