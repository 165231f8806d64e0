//! Risk scoring (R★) — the composite score in [0, 1] used everywhere
//! edits are ranked or gated.
//!
//! All scoring functions are pure and total: out-of-range inputs are
//! clamped, never rejected.

use serde::{Deserialize, Serialize};

use crate::config::ScoringSection;

/// Clamp a value into [0, 1]; NaN clamps to 0.
pub fn clamp01(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Composite risk score: `clamp(alpha*severity + beta*complexity)`.
pub fn rstar(severity: f64, complexity: f64, alpha: f64, beta: f64) -> f64 {
    clamp01(alpha * clamp01(severity) + beta * clamp01(complexity))
}

/// Cohesion bonus applied to an already-computed base score.
pub fn pack_score(base: f64, cohesion: f64, gamma: f64) -> f64 {
    clamp01(clamp01(base) + gamma * clamp01(cohesion))
}

/// R★ with a pack-cohesion bonus:
/// `clamp(rstar(severity, complexity) + gamma*cohesion)`.
pub fn rstar_pack(
    severity: f64,
    complexity: f64,
    cohesion: f64,
    alpha: f64,
    beta: f64,
    gamma: f64,
) -> f64 {
    pack_score(rstar(severity, complexity, alpha, beta), cohesion, gamma)
}

/// Policy band a score falls into. Lower bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Score at or above the auto threshold — safe to apply unattended.
    Auto,
    /// Score in the suggest band — surface to the user, do not apply.
    Suggest,
    /// Below the suggest threshold — not worth surfacing.
    Skip,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Suggest => "suggest",
            Self::Skip => "skip",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Band a score: `score >= auto` → Auto, `suggest <= score < auto` →
/// Suggest, otherwise Skip.
pub fn decision(score: f64, auto_threshold: f64, suggest_threshold: f64) -> Decision {
    if score >= auto_threshold {
        Decision::Auto
    } else if score >= suggest_threshold {
        Decision::Suggest
    } else {
        Decision::Skip
    }
}

/// Effective gating score for a plan: its base risk plus the
/// pack-cohesion bonus when the plan was synthesized from a pack.
pub fn effective_score(plan: &crate::types::EditPlan, scoring: &ScoringSection) -> f64 {
    match plan.cohesion {
        Some(cohesion) => pack_score(plan.estimated_risk, cohesion, scoring.gamma),
        None => clamp01(plan.estimated_risk),
    }
}

/// Complexity input for a plan: lines touched, saturating at 50.
pub fn plan_complexity(lines_touched: u64) -> f64 {
    clamp01(lines_touched as f64 / 50.0)
}

// ── Tests ──────────────────────────────────────────────────────────
