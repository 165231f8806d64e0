//! Policy gate — decides per plan whether an edit may auto-apply, is
//! only suggested, or is denied outright.
//!
//! Consumes configuration read-only; thresholds and per-rule modes are
//! passed in at construction, never read from ambient state.

use serde::{Deserialize, Serialize};

use crate::config::{RuleMode, RulesSection, ScoringSection};
use crate::rules::RuleRegistry;
use crate::score::{Decision, decision, effective_score};
use crate::types::EditPlan;

/// Gate verdict for one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    /// Policy allows unattended application.
    Approved { score: f64 },
    /// Surfaced to the user, never applied this run.
    Suggested { score: f64 },
    /// Not applied; carries the reason for reporting.
    Denied { score: f64, reason: String },
}

impl GateOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Threshold + rule-mode policy applied to scored plans.
#[derive(Debug)]
pub struct PolicyGate<'a> {
    scoring: &'a ScoringSection,
    rules: &'a RulesSection,
    registry: &'a RuleRegistry,
}

impl<'a> PolicyGate<'a> {
    pub fn new(
        scoring: &'a ScoringSection,
        rules: &'a RulesSection,
        registry: &'a RuleRegistry,
    ) -> Self {
        Self {
            scoring,
            rules,
            registry,
        }
    }

    /// Effective participation mode for a rule: config override first,
    /// then the rule's registered default, `Off` for unknown rules.
    pub fn rule_mode(&self, rule_id: &str) -> RuleMode {
        if let Some(mode) = self.rules.modes.get(rule_id) {
            return *mode;
        }
        self.registry
            .get(rule_id)
            .map_or(RuleMode::Off, |r| r.default_mode())
    }

    /// Evaluate one plan against thresholds and rule modes.
    pub fn evaluate(&self, plan: &EditPlan) -> GateOutcome {
        let score = effective_score(plan, self.scoring);

        let modes: Vec<(String, RuleMode)> = plan
            .rules()
            .iter()
            .map(|r| ((*r).to_string(), self.rule_mode(r)))
            .collect();

        if let Some((rule, _)) = modes.iter().find(|(_, m)| *m == RuleMode::Off) {
            return GateOutcome::Denied {
                score,
                reason: format!("rule '{rule}' is disabled"),
            };
        }

        let detect_only = modes.iter().any(|(_, m)| *m == RuleMode::DetectOnly);

        match decision(score, self.scoring.auto_threshold, self.scoring.suggest_threshold) {
            Decision::Auto if detect_only => GateOutcome::Suggested { score },
            Decision::Auto => GateOutcome::Approved { score },
            Decision::Suggest => GateOutcome::Suggested { score },
            Decision::Skip => GateOutcome::Denied {
                score,
                reason: format!(
                    "score {score:.2} below suggest threshold {:.2}",
                    self.scoring.suggest_threshold
                ),
            },
        }
    }
}
