use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a rule participates in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RuleMode {
    /// Findings may be refactored and auto-applied when policy allows.
    #[default]
    AutoFix,
    /// Findings are reported; edits are suggested at most, never applied.
    DetectOnly,
    /// Rule is disabled entirely.
    Off,
}

/// Top-level ACE configuration, matching `.ace/config.toml`.
///
/// Constructed once at process start and passed by reference into the
/// components that need it — no ambient globals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AceConfig {
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub packs: PacksSection,
    #[serde(default)]
    pub guard: GuardSection,
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub rules: RulesSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSection {
    /// Severity weight in R★.
    pub alpha: f64,
    /// Complexity weight in R★.
    pub beta: f64,
    /// Pack-cohesion bonus weight.
    pub gamma: f64,
    /// Scores at or above this auto-apply.
    pub auto_threshold: f64,
    /// Scores at or above this (but below auto) are suggested.
    pub suggest_threshold: f64,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            beta: 0.3,
            gamma: 0.2,
            auto_threshold: 0.70,
            suggest_threshold: 0.50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetSection {
    /// Cap on distinct files modified per run; `None` is unbounded.
    pub max_files: Option<usize>,
    /// Cap on total lines modified per run; `None` is unbounded.
    pub max_lines: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacksSection {
    pub enabled: bool,
    /// Groups with fewer findings than this are discarded.
    pub min_findings: usize,
}

impl Default for PacksSection {
    fn default() -> Self {
        Self {
            enabled: true,
            min_findings: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSection {
    /// Default verification strictness. Individual rules declare their
    /// own verification policy which takes precedence; this only gates
    /// ad-hoc verifications with no owning rule.
    pub strict: bool,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self { strict: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSection {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            include_patterns: vec!["**/*.py".into()],
            exclude_patterns: vec![
                "**/.git/**".into(),
                "**/.ace/**".into(),
                "**/__pycache__/**".into(),
                "**/venv/**".into(),
                "**/.venv/**".into(),
                "**/node_modules/**".into(),
                "**/build/**".into(),
                "**/dist/**".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesSection {
    /// Per-rule participation overrides; unlisted rules use the rule's
    /// registered default.
    pub modes: BTreeMap<String, RuleMode>,
    /// Hard cap on findings carried past the filter stage.
    pub max_findings: usize,
}

impl Default for RulesSection {
    fn default() -> Self {
        Self {
            modes: BTreeMap::new(),
            max_findings: 500,
        }
    }
}

impl AceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject semantically invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        for (name, v) in [
            ("alpha", s.alpha),
            ("beta", s.beta),
            ("gamma", s.gamma),
            ("auto_threshold", s.auto_threshold),
            ("suggest_threshold", s.suggest_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::Invalid(format!(
                    "scoring.{name} must be in [0, 1], got {v}"
                )));
            }
        }
        if s.suggest_threshold > s.auto_threshold {
            return Err(ConfigError::Invalid(format!(
                "scoring.suggest_threshold ({}) exceeds auto_threshold ({})",
                s.suggest_threshold, s.auto_threshold
            )));
        }
        if self.packs.min_findings == 0 {
            return Err(ConfigError::Invalid(
                "packs.min_findings must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Serialized default config, written by `ace init`.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).expect("default config is serializable")
    }
}
