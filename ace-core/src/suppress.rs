//! Inline suppression directives, parsed from Python comments.
//!
//! Supported forms, optionally scoped to rules with `=r1,r2`:
//!
//! ```text
//! # ace: disable            .. # ace: enable     (block)
//! x = 1  # ace: disable-line
//! # ace: disable-next-line
//! ```
//!
//! An unscoped directive applies to every rule. Block disables without
//! a matching enable run to end of file. A `#` inside a string literal
//! does not start a directive.

use std::collections::BTreeMap;

/// Rule scope of one directive. Empty set means all rules.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    All,
    Rules(Vec<String>),
}

impl Scope {
    fn covers(&self, rule: &str) -> bool {
        match self {
            Self::All => true,
            Self::Rules(rules) => rules.iter().any(|r| r == rule),
        }
    }
}

/// Parsed suppression state for one file.
#[derive(Debug, Default)]
pub struct SuppressionSet {
    /// line → scope, for `disable-line` and `disable-next-line`.
    line_scopes: BTreeMap<u32, Vec<Scope>>,
    /// Inclusive line ranges disabled by block directives.
    ranges: Vec<(u32, u32, Scope)>,
}

impl SuppressionSet {
    pub fn is_empty(&self) -> bool {
        self.line_scopes.is_empty() && self.ranges.is_empty()
    }

    /// Is `rule` suppressed at 1-based `line`?
    pub fn is_suppressed(&self, line: u32, rule: &str) -> bool {
        if let Some(scopes) = self.line_scopes.get(&line) {
            if scopes.iter().any(|s| s.covers(rule)) {
                return true;
            }
        }
        self.ranges
            .iter()
            .any(|(start, end, scope)| (*start..=*end).contains(&line) && scope.covers(rule))
    }
}

/// Scan `source` for `# ace:` directives.
pub fn parse_suppressions(source: &str) -> SuppressionSet {
    let mut set = SuppressionSet::default();
    // Open block disables, awaiting their enable.
    let mut open: Vec<(u32, Scope)> = Vec::new();
    let mut last_line = 0u32;
    // Triple-quoted string delimiter still open from a previous line.
    let mut open_string: Option<&'static str> = None;

    for (idx, text) in source.lines().enumerate() {
        let line = idx as u32 + 1;
        last_line = line;
        let (hash, next_open) = scan_line(text, open_string);
        open_string = next_open;
        let Some(directive) = hash.and_then(|at| extract_directive(text, at)) else {
            continue;
        };
        let (verb, scope) = split_scope(directive);
        match verb {
            "disable" => open.push((line, scope)),
            "enable" => {
                // Close the most recent open block this enable covers.
                if let Some(pos) = open.iter().rposition(|(_, s)| match (&scope, s) {
                    (Scope::All, _) => true,
                    (Scope::Rules(a), Scope::Rules(b)) => a == b,
                    (Scope::Rules(_), Scope::All) => false,
                }) {
                    let (start, s) = open.remove(pos);
                    set.ranges.push((start, line, s));
                }
            }
            "disable-line" => set.line_scopes.entry(line).or_default().push(scope),
            "disable-next-line" => set.line_scopes.entry(line + 1).or_default().push(scope),
            _ => {
                tracing::warn!(line, verb, "unknown suppression directive ignored");
            }
        }
    }

    // Unclosed blocks run to end of file.
    for (start, scope) in open {
        set.ranges.push((start, last_line, scope));
    }
    set
}

/// Byte offset of the first `#` on `line` that starts a comment,
/// skipping string-literal content. `open` is the delimiter of a
/// triple-quoted string left open by a previous line; the second
/// element is the state carried to the next line.
fn scan_line(line: &str, mut open: Option<&'static str>) -> (Option<usize>, Option<&'static str>) {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(delim) = open {
            if bytes[i..].starts_with(delim.as_bytes()) {
                i += delim.len();
                open = None;
            } else {
                i += 1;
            }
            continue;
        }
        match bytes[i] {
            b'#' => return (Some(i), None),
            quote @ (b'"' | b'\'') => {
                let delim: &'static str = if quote == b'"' { "\"\"\"" } else { "'''" };
                if bytes[i..].starts_with(delim.as_bytes()) {
                    open = Some(delim);
                    i += delim.len();
                } else {
                    // Single-quoted string: runs to the closing quote
                    // or end of line.
                    i += 1;
                    while i < bytes.len() && bytes[i] != quote {
                        i += if bytes[i] == b'\\' { 2 } else { 1 };
                    }
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (None, open)
}

fn extract_directive(line: &str, at: usize) -> Option<&str> {
    let rest = line[at + 1..].trim_start();
    rest.strip_prefix("ace:").map(str::trim)
}

fn split_scope(directive: &str) -> (&str, Scope) {
    match directive.split_once('=') {
        Some((verb, rules)) => {
            let rules: Vec<String> = rules
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
            if rules.is_empty() {
                (verb.trim(), Scope::All)
            } else {
                (verb.trim(), Scope::Rules(rules))
            }
        }
        None => (directive.trim(), Scope::All),
    }
}
