//! Guard — the verification gate an edit must pass before being kept.
//!
//! Three ordered checks over (before, after) content, short-circuiting
//! on the first failure:
//!
//! 1. **parse** — the after content must parse as valid Python;
//! 2. **`ast_equiv`** (strict only) — before and after must have
//!    identical structural fingerprints once comments and positions
//!    are stripped;
//! 3. **round-trip** — reparsing the after content must reproduce an
//!    identical fingerprint (printer/parser stability).
//!
//! A failed check is a *verdict*, returned as a [`GuardResult`] —
//! never an `Err`. Only engine-level failures (grammar loading, parser
//! cancellation) surface as [`GuardEngineError`].

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tree_sitter::{Node, Parser, Tree};

use crate::error::GuardEngineError;

/// Which check failed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardType {
    /// After content does not parse.
    Parse,
    /// Structural fingerprints diverge under strict verification.
    AstEquiv,
    /// Reparse of the after content is unstable.
    CstApply,
}

impl GuardType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::AstEquiv => "ast_equiv",
            Self::CstApply => "cst_apply",
        }
    }
}

impl std::fmt::Display for GuardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one verification attempt. Terminal — produced once,
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardResult {
    pub passed: bool,
    pub file: PathBuf,
    pub before_content: String,
    pub after_content: String,
    pub errors: Vec<String>,
    /// Check that failed first; `None` when all passed.
    pub guard_type: Option<GuardType>,
}

impl GuardResult {
    fn pass(file: &Path, before: &str, after: &str) -> Self {
        Self {
            passed: true,
            file: file.to_path_buf(),
            before_content: before.to_string(),
            after_content: after.to_string(),
            errors: Vec::new(),
            guard_type: None,
        }
    }

    fn fail(file: &Path, before: &str, after: &str, kind: GuardType, errors: Vec<String>) -> Self {
        Self {
            passed: false,
            file: file.to_path_buf(),
            before_content: before.to_string(),
            after_content: after.to_string(),
            errors,
            guard_type: Some(kind),
        }
    }
}

/// Python source verifier backed by tree-sitter.
pub struct Guard {
    parser: Parser,
}

// `tree_sitter::Parser` has no `Debug` impl.
impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}

impl Guard {
    pub fn new() -> Result<Self, GuardEngineError> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
        Ok(Self { parser })
    }

    /// Run the ordered checks over before/after content.
    pub fn verify(
        &mut self,
        file: &Path,
        before: &str,
        after: &str,
        strict: bool,
    ) -> Result<GuardResult, GuardEngineError> {
        // Gate 1: the edited content must parse.
        let after_tree = self.parse(file, after)?;
        let parse_errors = collect_parse_errors(after_tree.root_node(), after);
        if !parse_errors.is_empty() {
            return Ok(GuardResult::fail(
                file,
                before,
                after,
                GuardType::Parse,
                parse_errors,
            ));
        }

        let after_print = fingerprint(&after_tree, after);

        // Gate 2: structural equivalence (strict mode only).
        if strict {
            let before_tree = self.parse(file, before)?;
            // Unparseable before-content cannot anchor an equivalence
            // check; only the parse and round-trip gates apply then.
            if !before_tree.root_node().has_error() {
                let before_print = fingerprint(&before_tree, before);
                if before_print != after_print {
                    let diff = fingerprint_diff(&before_print, &after_print);
                    return Ok(GuardResult::fail(
                        file,
                        before,
                        after,
                        GuardType::AstEquiv,
                        vec![format!("structural divergence:\n{diff}")],
                    ));
                }
            }
        }

        // Gate 3: reparse stability.
        let reparsed = self.parse(file, after)?;
        if fingerprint(&reparsed, after) != after_print {
            return Ok(GuardResult::fail(
                file,
                before,
                after,
                GuardType::CstApply,
                vec!["reparse of edited content produced a different tree".to_string()],
            ));
        }

        Ok(GuardResult::pass(file, before, after))
    }

    /// Convenience wrapper that reads before-content from disk.
    /// Non-Python files are a pass-through (always `passed = true`).
    pub fn verify_file_edit(
        &mut self,
        path: &Path,
        after: &str,
        strict: bool,
    ) -> Result<GuardResult, GuardEngineError> {
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            return Ok(GuardResult::pass(path, "", after));
        }
        let before = std::fs::read_to_string(path)?;
        self.verify(path, &before, after, strict)
    }

    fn parse(&mut self, file: &Path, source: &str) -> Result<Tree, GuardEngineError> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| GuardEngineError::NoTree(file.display().to_string()))
    }
}

/// Structural fingerprint of a parse tree: one line per node with
/// depth, kind, and leaf token text. Comments are skipped, positions
/// never recorded — two sources with the same program structure print
/// identically regardless of formatting.
fn fingerprint(tree: &Tree, source: &str) -> String {
    let mut out = String::new();
    write_node(tree.root_node(), source, 0, &mut out);
    out
}

fn write_node(node: Node<'_>, source: &str, depth: usize, out: &mut String) {
    if node.kind() == "comment" {
        return;
    }
    if node.child_count() == 0 {
        let text = node.utf8_text(source.as_bytes()).unwrap_or("");
        let _ = writeln!(out, "{depth}:{}:{text}", node.kind());
    } else {
        let _ = writeln!(out, "{depth}:{}", node.kind());
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            write_node(child, source, depth + 1, out);
        }
    }
}

fn collect_parse_errors(root: Node<'_>, source: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if root.has_error() {
        collect_error_nodes(root, source, &mut errors);
        if errors.is_empty() {
            errors.push("source contains a parse error".to_string());
        }
    }
    errors
}

fn collect_error_nodes(node: Node<'_>, source: &str, errors: &mut Vec<String>) {
    if node.is_error() || node.is_missing() {
        let line = node.start_position().row + 1;
        let excerpt: String = node
            .utf8_text(source.as_bytes())
            .unwrap_or("")
            .chars()
            .take(40)
            .collect();
        let what = if node.is_missing() { "missing" } else { "error" };
        errors.push(format!("{what} node at line {line}: {excerpt:?}"));
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, source, errors);
    }
}

/// Short unified-diff excerpt of two fingerprints for error messages.
fn fingerprint_diff(before: &str, after: &str) -> String {
    let diff = TextDiff::from_lines(before, after);
    let mut out = String::new();
    let mut shown = 0usize;
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => continue,
        };
        let _ = write!(out, "{sign}{change}");
        shown += 1;
        if shown >= 8 {
            let _ = writeln!(out, "...");
            break;
        }
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> Guard {
        Guard::new().unwrap()
    }

    fn verify(before: &str, after: &str, strict: bool) -> GuardResult {
        guard()
            .verify(Path::new("test.py"), before, after, strict)
            .unwrap()
    }

    #[test]
    fn debug_impl_elides_parser_state() {
        let rendered = format!("{:?}", guard());
        assert!(rendered.starts_with("Guard"));
    }

    #[test]
    fn identical_content_passes_strict() {
        let r = verify("x = 1\n", "x = 1\n", true);
        assert!(r.passed);
        assert!(r.guard_type.is_none());
    }

    #[test]
    fn comment_only_change_passes_strict() {
        let r = verify("x = 1\n", "x = 1  # comment\n", true);
        assert!(r.passed, "comments are not part of the comparison: {:?}", r.errors);
    }

    #[test]
    fn whitespace_only_change_passes_strict() {
        let r = verify("def f():   \n    return 1\n", "def f():\n    return 1\n", true);
        assert!(r.passed, "{:?}", r.errors);
    }

    #[test]
    fn value_change_fails_ast_equiv() {
        let r = verify("x = 1\n", "x = 2\n", true);
        assert!(!r.passed);
        assert_eq!(r.guard_type, Some(GuardType::AstEquiv));
        assert!(!r.errors.is_empty());
    }

    #[test]
    fn added_argument_fails_strict_but_passes_relaxed() {
        let before = "import requests\nrequests.get(url)\n";
        let after = "import requests\nrequests.get(url, timeout=30)\n";
        assert!(!verify(before, after, true).passed);
        assert!(verify(before, after, false).passed);
    }

    #[test]
    fn syntax_error_fails_parse_gate() {
        let r = verify("x = 1\n", "def broken(:\n", false);
        assert!(!r.passed);
        assert_eq!(r.guard_type, Some(GuardType::Parse));
        assert!(!r.errors.is_empty());
    }

    #[test]
    fn parse_gate_runs_before_ast_equiv() {
        let r = verify("x = 1\n", "x = = 1\n", true);
        assert_eq!(r.guard_type, Some(GuardType::Parse));
    }

    #[test]
    fn non_python_file_is_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{}").unwrap();
        let r = guard().verify_file_edit(&path, "{\"a\": 1}", true).unwrap();
        assert!(r.passed);
    }

    #[test]
    fn file_edit_wrapper_reads_before_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.py");
        std::fs::write(&path, "x = 1\n").unwrap();
        let r = guard().verify_file_edit(&path, "x = 2\n", true).unwrap();
        assert!(!r.passed);
        assert_eq!(r.before_content, "x = 1\n");
    }

    #[test]
    fn fingerprint_ignores_comments_and_layout() {
        let mut g = guard();
        let t1 = g.parse(Path::new("a.py"), "x = 1\n# note\ny = 2\n").unwrap();
        let t2 = g.parse(Path::new("a.py"), "x = 1\ny = 2\n").unwrap();
        assert_eq!(
            fingerprint(&t1, "x = 1\n# note\ny = 2\n"),
            fingerprint(&t2, "x = 1\ny = 2\n")
        );
    }

    #[test]
    fn fingerprint_captures_leaf_tokens() {
        let mut g = guard();
        let s1 = "x = a + b\n";
        let s2 = "x = a - b\n";
        let t1 = g.parse(Path::new("a.py"), s1).unwrap();
        let t2 = g.parse(Path::new("a.py"), s2).unwrap();
        assert_ne!(fingerprint(&t1, s1), fingerprint(&t2, s2));
    }
}
