use std::path::Path;

use crate::config::RuleMode;
use crate::types::{Finding, Severity};

use super::helpers::{node_line, node_text, parse_python, source_line, visit_nodes};
use super::{RefactorOutcome, Rule, RuleError, Verification};

/// Flags mutable default argument values (`def f(x=[])`, `={}`,
/// `=set()`), the classic shared-state trap.
///
/// Detect-only: the correct rewrite (sentinel + body guard) is not a
/// line-local edit, so no refactor is offered.
#[derive(Debug)]
pub struct MutableDefaultArg;

impl Rule for MutableDefaultArg {
    fn id(&self) -> &'static str {
        "mutable-default-arg"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn default_mode(&self) -> RuleMode {
        RuleMode::DetectOnly
    }

    fn verification(&self) -> Verification {
        Verification::Strict
    }

    fn analyze(&self, source: &str, path: &Path) -> Result<Vec<Finding>, RuleError> {
        let tree = parse_python(source, path)?;
        let mut findings = Vec::new();

        visit_nodes(tree.root_node(), &mut |node| {
            if node.kind() != "default_parameter" && node.kind() != "typed_default_parameter" {
                return;
            }
            let Some(value) = node.child_by_field_name("value") else {
                return;
            };
            let mutable = match value.kind() {
                "list" | "dictionary" | "set" => true,
                "call" => value
                    .child_by_field_name("function")
                    .is_some_and(|f| matches!(node_text(f, source), "list" | "dict" | "set")),
                _ => false,
            };
            if mutable {
                let line = node_line(node);
                findings.push(
                    Finding::new(
                        path,
                        line,
                        self.id(),
                        self.severity(),
                        format!(
                            "mutable default `{}` is shared across calls",
                            node_text(value, source)
                        ),
                    )
                    .with_snippet(source_line(source, line).unwrap_or_default())
                    .with_suggestion("use None as the default and construct inside the body"),
                );
            }
        });

        Ok(findings)
    }

    fn refactor(&self, _source: &str, _path: &Path, _findings: &[Finding]) -> RefactorOutcome {
        RefactorOutcome::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: MutableDefaultArg = MutableDefaultArg;

    #[test]
    fn detects_literal_mutables() {
        let src = "def f(a=[], b={}, c=7):\n    pass\n";
        let findings = RULE.analyze(src, Path::new("a.py")).unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings[0].message.contains("[]"));
    }

    #[test]
    fn detects_constructor_calls() {
        let src = "def f(a=set(), b=dict(), c=list()):\n    pass\n";
        let findings = RULE.analyze(src, Path::new("a.py")).unwrap();
        assert_eq!(findings.len(), 3);
    }

    #[test]
    fn detects_typed_defaults() {
        let src = "def f(a: list = []):\n    pass\n";
        let findings = RULE.analyze(src, Path::new("a.py")).unwrap();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn immutable_defaults_pass() {
        let src = "def f(a=None, b=0, c=\"x\", d=()):\n    pass\n";
        assert!(RULE.analyze(src, Path::new("a.py")).unwrap().is_empty());
    }

    #[test]
    fn user_constructors_not_flagged() {
        let src = "def f(a=Config()):\n    pass\n";
        assert!(RULE.analyze(src, Path::new("a.py")).unwrap().is_empty());
    }

    #[test]
    fn no_refactor_offered() {
        assert!(matches!(
            RULE.refactor("", Path::new("a.py"), &[]),
            RefactorOutcome::Unchanged
        ));
    }
}
