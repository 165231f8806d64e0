//! Rule registry — detectors and refactors keyed by stable rule ID.
//!
//! The orchestrator never branches on rule strings; every rule is an
//! object registered here, exposing `analyze` and `refactor`
//! capabilities plus its verification policy.

mod bare_except;
mod helpers;
mod mutable_default;
mod trailing_whitespace;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RuleMode;
use crate::types::{Edit, Finding, Severity};

pub use bare_except::BareExcept;
pub use mutable_default::MutableDefaultArg;
pub use trailing_whitespace::TrailingWhitespace;

/// A detector failure, caught at the per-file boundary and never fatal.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct RuleError(pub String);

/// How a rule's edits are verified by the guard.
///
/// Cosmetic rules declare `Strict` and must preserve the structural
/// fingerprint; rules whose whole point is a semantic change declare
/// `Relaxed` and are held to parse + round-trip validity only. There
/// is deliberately no global strict flag for rule output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    Strict,
    Relaxed,
}

/// Tagged refactor result — a transform never swallows a failure into
/// a silent default, so failure statistics stay accurate.
#[derive(Debug, Clone)]
pub enum RefactorOutcome {
    /// Edits to apply, non-overlapping within this rule's output.
    Changed(Vec<Edit>),
    /// Nothing to do for these findings.
    Unchanged,
    /// The transform could not synthesize a safe edit.
    Failed(String),
}

/// One lint rule: a detector plus an optional refactor.
pub trait Rule: Send + Sync {
    /// Stable rule identifier.
    fn id(&self) -> &'static str;

    fn severity(&self) -> Severity;

    /// Participation when the config has no override for this rule.
    fn default_mode(&self) -> RuleMode;

    /// Verification policy for this rule's edits.
    fn verification(&self) -> Verification;

    /// Scan one file's source for findings.
    fn analyze(&self, source: &str, path: &Path) -> Result<Vec<Finding>, RuleError>;

    /// Synthesize edits addressing `findings` in `source`.
    fn refactor(&self, source: &str, path: &Path, findings: &[Finding]) -> RefactorOutcome;
}

/// Registry mapping rule ID to handler.
#[derive(Clone)]
pub struct RuleRegistry {
    rules: BTreeMap<&'static str, Arc<dyn Rule>>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Registry with the built-in rule set.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TrailingWhitespace));
        registry.register(Arc::new(BareExcept));
        registry.register(Arc::new(MutableDefaultArg));
        registry
    }

    pub fn register(&mut self, rule: Arc<dyn Rule>) {
        self.rules.insert(rule.id(), rule);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Rule>> {
        self.rules.get(id)
    }

    /// Rules in deterministic (ID) order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Strictest verification mode across the given rules; a plan that
    /// mixes strict and relaxed rules is verified relaxed, since its
    /// relaxed constituents are expected to change structure.
    pub fn plan_verification<'a>(&self, rules: impl IntoIterator<Item = &'a str>) -> Verification {
        let mut verification = Verification::Strict;
        for id in rules {
            match self.get(id).map(|r| r.verification()) {
                Some(Verification::Relaxed) | None => verification = Verification::Relaxed,
                Some(Verification::Strict) => {}
            }
        }
        verification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_contents() {
        let registry = RuleRegistry::builtin();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("trailing-whitespace").is_some());
        assert!(registry.get("bare-except").is_some());
        assert!(registry.get("mutable-default-arg").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn iteration_order_is_deterministic() {
        let registry = RuleRegistry::builtin();
        let ids: Vec<&str> = registry.iter().map(|r| r.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn plan_verification_takes_weakest_mode() {
        let registry = RuleRegistry::builtin();
        assert_eq!(
            registry.plan_verification(["trailing-whitespace"]),
            Verification::Strict
        );
        assert_eq!(
            registry.plan_verification(["bare-except"]),
            Verification::Relaxed
        );
        assert_eq!(
            registry.plan_verification(["trailing-whitespace", "bare-except"]),
            Verification::Relaxed
        );
        // Unknown rules verify relaxed rather than over-claiming.
        assert_eq!(registry.plan_verification(["mystery"]), Verification::Relaxed);
    }
}
