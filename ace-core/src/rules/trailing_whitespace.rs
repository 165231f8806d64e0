use std::path::Path;

use crate::config::RuleMode;
use crate::types::{Edit, Finding, Severity};

use super::helpers::source_line;
use super::{RefactorOutcome, Rule, RuleError, Verification};

/// Flags and strips trailing blanks at end of line.
///
/// Purely cosmetic, so it verifies strict — with one deliberate
/// exception the guard catches: a "trailing blank" inside a
/// triple-quoted string is string content, and trimming it changes the
/// program. The strict check rejects exactly those edits and the
/// repair engine salvages the rest.
#[derive(Debug)]
pub struct TrailingWhitespace;

impl Rule for TrailingWhitespace {
    fn id(&self) -> &'static str {
        "trailing-whitespace"
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn default_mode(&self) -> RuleMode {
        RuleMode::AutoFix
    }

    fn verification(&self) -> Verification {
        Verification::Strict
    }

    fn analyze(&self, source: &str, path: &Path) -> Result<Vec<Finding>, RuleError> {
        let mut findings = Vec::new();
        for (idx, line) in source.lines().enumerate() {
            if line.ends_with(' ') || line.ends_with('\t') {
                let line_no = u32::try_from(idx).unwrap_or(u32::MAX - 1) + 1;
                findings.push(
                    Finding::new(
                        path,
                        line_no,
                        self.id(),
                        self.severity(),
                        format!("line {line_no} has trailing whitespace"),
                    )
                    .with_snippet(line)
                    .with_suggestion(line.trim_end()),
                );
            }
        }
        Ok(findings)
    }

    fn refactor(&self, source: &str, _path: &Path, findings: &[Finding]) -> RefactorOutcome {
        let mut edits = Vec::new();
        for finding in findings {
            let Some(line) = source_line(source, finding.line) else {
                return RefactorOutcome::Failed(format!(
                    "line {} no longer exists",
                    finding.line
                ));
            };
            let trimmed = line.trim_end();
            if trimmed == line {
                continue;
            }
            match Edit::replace(&finding.file, finding.line, finding.line, trimmed) {
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
