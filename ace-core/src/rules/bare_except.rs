use std::path::Path;

use crate::config::RuleMode;
use crate::types::{Edit, Finding, Severity};

use super::helpers::{node_line, parse_python, source_line, visit_nodes};
use super::{RefactorOutcome, Rule, RuleError, Verification};

/// Flags `except:` handlers that swallow every exception (including
/// `KeyboardInterrupt` and `SystemExit`) and narrows them to
/// `except Exception:`.
///
/// The fix intentionally changes program structure, so it verifies
/// relaxed: parse + round-trip validity, no structural-equivalence
/// requirement.
#[derive(Debug)]
pub struct BareExcept;

impl Rule for BareExcept {
    fn id(&self) -> &'static str {
        "bare-except"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn default_mode(&self) -> RuleMode {
        RuleMode::AutoFix
    }

    fn verification(&self) -> Verification {
        Verification::Relaxed
    }

    fn analyze(&self, source: &str, path: &Path) -> Result<Vec<Finding>, RuleError> {
        let tree = parse_python(source, path)?;
        let mut findings = Vec::new();

        visit_nodes(tree.root_node(), &mut |node| {
            if node.kind() != "except_clause" {
                return;
            }
            // A bare handler names no exception type: its only named
            // children are the body block (and comments).
            let mut cursor = node.walk();
            let is_bare = node
                .named_children(&mut cursor)
                .all(|c| matches!(c.kind(), "block" | "comment"));
            if is_bare {
                let line = node_line(node);
                findings.push(
                    Finding::new(
                        path,
                        line,
                        self.id(),
                        self.severity(),
                        format!("bare `except:` at line {line} catches system-exiting exceptions"),
                    )
                    .with_snippet(source_line(source, line).unwrap_or_default())
                    .with_suggestion("except Exception:"),
                );
            }
        });

        Ok(findings)
    }

    fn refactor(&self, source: &str, _path: &Path, findings: &[Finding]) -> RefactorOutcome {
        let mut edits = Vec::new();
        for finding in findings {
            let Some(line) = source_line(source, finding.line) else {
                return RefactorOutcome::Failed(format!("line {} no longer exists", finding.line));
            };
            let Some(narrowed) = narrow_bare_except(line) else {
                return RefactorOutcome::Failed(format!(
                    "no bare `except:` on line {}",
                    finding.line
                ));
            };
            match Edit::replace(&finding.file, finding.line, finding.line, narrowed) {
                Ok(edit) => edits.push(edit),
                Err(e) => return RefactorOutcome::Failed(e.to_string()),
            }
        }
        if edits.is_empty() {
            RefactorOutcome::Unchanged
        } else {
            RefactorOutcome::Changed(edits)
        }
    }
}

/// Rewrite the first bare `except` on the line to `except Exception`.
fn narrow_bare_except(line: &str) -> Option<String> {
    let start = line.find("except")?;
    let rest = &line[start + "except".len()..];
    let colon_offset = rest.find(':')?;
    if !rest[..colon_offset].trim().is_empty() {
        return None; // already names a type
    }
    Some(format!(
        "{}except Exception{}",
        &line[..start],
        &rest[colon_offset..]
    ))
}
