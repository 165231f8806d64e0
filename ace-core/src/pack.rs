//! Macro-fix packs — bundles of related findings in one context,
//! fixed together as a single cohesive edit plan.
//!
//! Overlap between constituent edits is the only failure mode here; it
//! never raises, it falls back to individual plans so the user never
//! loses a fix outright.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{EditPlan, Finding, find_overlap, sha256_hex};

/// Context granularity a recipe groups findings by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Whole file.
    File,
    /// 50-line bucket, approximating a function.
    Function,
    /// 100-line bucket, approximating a class.
    Class,
}

impl Granularity {
    fn bucket_size(self) -> Option<u32> {
        match self {
            Self::File => None,
            Self::Function => Some(50),
            Self::Class => Some(100),
        }
    }
}

/// A known combination of related rules worth fixing as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    /// Rules this recipe bundles.
    pub rules: BTreeSet<String>,
    pub granularity: Granularity,
    pub description: String,
}

impl Recipe {
    pub fn new(
        id: impl Into<String>,
        rules: impl IntoIterator<Item = impl Into<String>>,
        granularity: Granularity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rules: rules.into_iter().map(Into::into).collect(),
            granularity,
            description: description.into(),
        }
    }
}

/// Findings matched to one recipe within one context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub recipe_id: String,
    pub context_id: String,
    pub findings: Vec<Finding>,
    /// Fraction of the recipe's rule set actually matched, in (0, 1].
    pub cohesion: f64,
}

impl Pack {
    pub fn id(&self) -> String {
        format!("{}@{}", self.recipe_id, self.context_id)
    }
}

/// Deterministic context key for a finding under a granularity:
/// the file path, or `"{file}::L{lo}-{hi}"` line buckets.
pub fn compute_context_id(finding: &Finding, granularity: Granularity) -> String {
    match granularity.bucket_size() {
        None => finding.file.display().to_string(),
        Some(size) => {
            let bucket = finding.line / size;
            format!(
                "{}::L{}-{}",
                finding.file.display(),
                bucket * size,
                (bucket + 1) * size
            )
        }
    }
}

/// Group findings by `(recipe, context)` and keep the cohesive groups.
///
/// Output is sorted by `(-cohesion, context_id)` for determinism.
pub fn find_packs(findings: &[Finding], recipes: &[Recipe], min_findings: usize) -> Vec<Pack> {
    let mut groups: BTreeMap<(String, String), Vec<Finding>> = BTreeMap::new();

    for recipe in recipes {
        for finding in findings {
            if recipe.rules.contains(&finding.rule) {
                let context = compute_context_id(finding, recipe.granularity);
                groups
                    .entry((recipe.id.clone(), context))
                    .or_default()
                    .push(finding.clone());
            }
        }
    }

    let mut packs: Vec<Pack> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= min_findings)
        .map(|((recipe_id, context_id), members)| {
            let recipe = recipes
                .iter()
                .find(|r| r.id == recipe_id)
                .expect("group key came from this recipe list");
            let matched: BTreeSet<&str> = members.iter().map(|f| f.rule.as_str()).collect();
            let cohesion = matched.len() as f64 / recipe.rules.len() as f64;
            Pack {
                recipe_id,
                context_id,
                findings: members,
                cohesion,
            }
        })
        .collect();

    packs.sort_by(|a, b| {
        b.cohesion
            .partial_cmp(&a.cohesion)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.context_id.cmp(&b.context_id))
    });
    packs
}

/// Combine the individual plans covering a pack's findings into one
/// cohesive plan. Returns `None` when any two constituent edits
/// overlap — the caller falls back to the individual plans.
pub fn synthesize_pack_plan(pack: &Pack, individual_plans: &[EditPlan]) -> Option<EditPlan> {
    let member_ids: HashSet<String> = pack.findings.iter().map(Finding::stable_id).collect();

    let constituents: Vec<&EditPlan> = individual_plans
        .iter()
        .filter(|plan| {
            !plan.findings.is_empty()
                && plan
                    .findings
                    .iter()
                    .all(|f| member_ids.contains(&f.stable_id()))
        })
        .collect();
    if constituents.is_empty() {
        return None;
    }

    let mut edits = Vec::new();
    let mut findings = Vec::new();
    let mut invariants: Vec<String> = Vec::new();
    let mut estimated_risk = 0.0f64;

    for plan in &constituents {
        edits.extend(plan.edits.iter().cloned());
        findings.extend(plan.findings.iter().cloned());
        for inv in &plan.invariants {
            if !invariants.contains(inv) {
                invariants.push(inv.clone());
            }
        }
        estimated_risk = estimated_risk.max(plan.estimated_risk);
    }

    if find_overlap(&edits).is_some() {
        return None;
    }

    edits.sort_by(|a, b| a.file.cmp(&b.file).then(a.start_line.cmp(&b.start_line)));

    let mut stable_ids: Vec<String> = findings.iter().map(Finding::stable_id).collect();
    stable_ids.sort_unstable();
    let id_material = format!("pack:{}:{}", pack.id(), stable_ids.join(","));
    let id = sha256_hex(id_material.as_bytes())[..16].to_string();

    Some(EditPlan {
        id,
        findings,
        edits,
        invariants,
        estimated_risk,
        cohesion: Some(pack.cohesion),
    })
}

/// Attempt synthesis for every pack. Plans whose findings were not
/// absorbed into a successful pack come back as fallback plans,
/// including constituents of packs that failed on overlap.
pub fn synthesize_pack_plans(
    packs: &[Pack],
    individual_plans: &[EditPlan],
) -> (Vec<EditPlan>, Vec<EditPlan>) {
    let mut pack_plans = Vec::new();
    let mut absorbed: HashSet<String> = HashSet::new();

    for pack in packs {
        if let Some(plan) = synthesize_pack_plan(pack, individual_plans) {
            // One finding belongs to at most one pack plan.
            let ids: Vec<String> = plan.findings.iter().map(Finding::stable_id).collect();
            if ids.iter().any(|id| absorbed.contains(id)) {
                continue;
            }
            absorbed.extend(ids);
            pack_plans.push(plan);
        }
    }

    let fallback: Vec<EditPlan> = individual_plans
        .iter()
        .filter(|plan| {
            !plan
                .findings
                .iter()
                .all(|f| absorbed.contains(&f.stable_id()))
        })
        .cloned()
        .collect();

    (pack_plans, fallback)
}

/// Recipes for the built-in rule set.
pub fn builtin_recipes() -> Vec<Recipe> {
    vec![
        Recipe::new(
            "file-hygiene",
            ["trailing-whitespace", "bare-except"],
            Granularity::File,
            "Per-file cleanup: whitespace hygiene and overly broad exception handlers",
        ),
        Recipe::new(
            "defensive-defaults",
            ["mutable-default-arg", "bare-except"],
            Granularity::Function,
            "Function-level robustness: argument defaults and exception scoping",
        ),
    ]
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Edit, Severity};

    fn finding(file: &str, line: u32, rule: &str) -> Finding {
        Finding::new(file, line, rule, Severity::Medium, format!("{rule} hit"))
    }

    fn recipe2() -> Recipe {
        Recipe::new("r", ["R1", "R2"], Granularity::File, "two-rule recipe")
    }

    fn plan_for(finding: Finding, start: u32, end: u32, risk: f64) -> EditPlan {
        let edit = Edit::replace(finding.file.clone(), start, end, "fixed").unwrap();
        EditPlan::new(vec![finding], vec![edit], vec!["syntax valid".into()], risk)
    }

    #[test]
    fn context_id_granularities() {
        let f = finding("test.py", 137, "R1");
        assert_eq!(compute_context_id(&f, Granularity::File), "test.py");
        assert_eq!(
            compute_context_id(&f, Granularity::Function),
            "test.py::L100-150"
        );
        assert_eq!(compute_context_id(&f, Granularity::Class), "test.py::L100-200");
    }

    #[test]
    fn two_findings_full_cohesion() {
        let findings = vec![finding("test.py", 10, "R1"), finding("test.py", 15, "R2")];
        let packs = find_packs(&findings, &[recipe2()], 2);
        assert_eq!(packs.len(), 1);
        assert!((packs[0].cohesion - 1.0).abs() < f64::EPSILON);
        assert_eq!(packs[0].findings.len(), 2);
    }

    #[test]
    fn partial_rule_match_halves_cohesion() {
        let findings = vec![finding("test.py", 10, "R1"), finding("test.py", 15, "R1")];
        let packs = find_packs(&findings, &[recipe2()], 2);
        assert_eq!(packs.len(), 1);
        assert!((packs[0].cohesion - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn sparse_groups_are_discarded() {
        let findings = vec![finding("test.py", 10, "R1")];
        assert!(find_packs(&findings, &[recipe2()], 2).is_empty());
    }

    #[test]
    fn cohesion_always_in_range() {
        let findings = vec![
            finding("a.py", 1, "R1"),
            finding("a.py", 2, "R2"),
            finding("b.py", 3, "R1"),
            finding("b.py", 9, "R1"),
        ];
        for pack in find_packs(&findings, &[recipe2()], 2) {
            assert!(pack.cohesion > 0.0 && pack.cohesion <= 1.0);
        }
    }

    #[test]
    fn pack_ordering_is_deterministic() {
        let findings = vec![
            finding("b.py", 1, "R1"),
            finding("b.py", 2, "R1"),
            finding("a.py", 1, "R1"),
            finding("a.py", 2, "R2"),
        ];
        let packs = find_packs(&findings, &[recipe2()], 2);
        // a.py matches both rules (cohesion 1.0) and sorts first.
        assert_eq!(packs[0].context_id, "a.py");
        assert_eq!(packs[1].context_id, "b.py");
    }

    #[test]
    fn synthesis_combines_plans() {
        let f1 = finding("test.py", 10, "R1");
        let f2 = finding("test.py", 15, "R2");
        let plans = vec![
            plan_for(f1.clone(), 10, 10, 0.4),
            plan_for(f2.clone(), 15, 15, 0.7),
        ];
        let packs = find_packs(&[f1, f2], &[recipe2()], 2);
        let combined = synthesize_pack_plan(&packs[0], &plans).unwrap();
        assert_eq!(combined.edits.len(), 2);
        assert_eq!(combined.findings.len(), 2);
        assert!((combined.estimated_risk - 0.7).abs() < f64::EPSILON);
        assert_eq!(combined.cohesion, Some(1.0));
        assert_eq!(combined.invariants.len(), 1, "invariants deduplicated");
        assert!(combined.edits[0].start_line < combined.edits[1].start_line);
    }

    #[test]
    fn synthesis_id_is_stable_across_plan_order() {
        let f1 = finding("test.py", 10, "R1");
        let f2 = finding("test.py", 15, "R2");
        let p1 = plan_for(f1.clone(), 10, 10, 0.4);
        let p2 = plan_for(f2.clone(), 15, 15, 0.7);
        let packs = find_packs(&[f1, f2], &[recipe2()], 2);
        let a = synthesize_pack_plan(&packs[0], &[p1.clone(), p2.clone()]).unwrap();
        let b = synthesize_pack_plan(&packs[0], &[p2, p1]).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn overlapping_edits_reject_synthesis() {
        let f1 = finding("test.py", 10, "R1");
        let f2 = finding("test.py", 11, "R2");
        let plans = vec![
            plan_for(f1.clone(), 10, 12, 0.4),
            plan_for(f2.clone(), 11, 11, 0.5),
        ];
        let packs = find_packs(&[f1, f2], &[recipe2()], 2);
        assert!(synthesize_pack_plan(&packs[0], &plans).is_none());
    }

    #[test]
    fn failed_packs_fall_back_to_individual_plans() {
        let f1 = finding("test.py", 10, "R1");
        let f2 = finding("test.py", 11, "R2");
        let plans = vec![
            plan_for(f1.clone(), 10, 12, 0.4),
            plan_for(f2.clone(), 11, 11, 0.5),
        ];
        let packs = find_packs(&[f1, f2], &[recipe2()], 2);
        let (pack_plans, fallback) = synthesize_pack_plans(&packs, &plans);
        assert!(pack_plans.is_empty());
        assert_eq!(fallback.len(), 2, "no fix is lost outright");
    }

    #[test]
    fn absorbed_plans_do_not_fall_back() {
        let f1 = finding("test.py", 10, "R1");
        let f2 = finding("test.py", 15, "R2");
        let f3 = finding("other.py", 3, "R1");
        let plans = vec![
            plan_for(f1.clone(), 10, 10, 0.4),
            plan_for(f2.clone(), 15, 15, 0.5),
            plan_for(f3.clone(), 3, 3, 0.2),
        ];
        let packs = find_packs(&[f1, f2, f3], &[recipe2()], 2);
        let (pack_plans, fallback) = synthesize_pack_plans(&packs, &plans);
        assert_eq!(pack_plans.len(), 1);
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].findings[0].file.display().to_string(), "other.py");
    }
}
