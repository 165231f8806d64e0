use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::error::PatchError;

/// SHA-256 digest as raw 64-character lowercase hex (no algorithm prefix).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ── Severity ───────────────────────────────────────────────────────

/// Finding severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Canonical numeric weight for risk scoring.
    ///
    /// Single table shared by every consumer — the budget orchestrator,
    /// the policy gate, and explain output all score severities
    /// identically.
    pub fn weight(self) -> f64 {
        match self {
            Self::Info => 0.1,
            Self::Low => 0.3,
            Self::Medium => 0.5,
            Self::High => 0.8,
            Self::Critical => 1.0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Finding ────────────────────────────────────────────────────────

/// One detected problem in one file. Immutable once produced by a
/// detector; compared across runs by [`Finding::stable_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub file: PathBuf,
    /// 1-based line number.
    pub line: u32,
    /// Stable rule identifier (e.g. `bare-except`).
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    pub fn new(
        file: impl Into<PathBuf>,
        line: u32,
        rule: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            rule: rule.into(),
            severity,
            message: message.into(),
            snippet: None,
            suggestion: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Deterministic fingerprint used for baseline diffing and skiplist
    /// keys. Line numbers are excluded so the ID survives line drift.
    pub fn stable_id(&self) -> String {
        let material = format!(
            "{}:{}:{}:{}",
            self.rule,
            self.file.display(),
            self.severity,
            self.message
        );
        sha256_hex(material.as_bytes())[..16].to_string()
    }
}

// ── Edits ──────────────────────────────────────────────────────────

/// Kind of textual edit over a line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditOp {
    Replace,
    Insert,
    Delete,
}

/// One textual edit: replace/insert/delete over an inclusive, 1-based
/// line range within a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub file: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub op: EditOp,
    /// Replacement or inserted text; empty for delete.
    pub payload: String,
}

impl Edit {
    /// Build an edit, rejecting inverted ranges and zero line numbers.
    pub fn new(
        file: impl Into<PathBuf>,
        start_line: u32,
        end_line: u32,
        op: EditOp,
        payload: impl Into<String>,
    ) -> Result<Self, PatchError> {
        if start_line == 0 || start_line > end_line {
            return Err(PatchError::InvalidRange {
                start: start_line,
                end: end_line,
            });
        }
        Ok(Self {
            file: file.into(),
            start_line,
            end_line,
            op,
            payload: payload.into(),
        })
    }

    pub fn replace(
        file: impl Into<PathBuf>,
        start_line: u32,
        end_line: u32,
        payload: impl Into<String>,
    ) -> Result<Self, PatchError> {
        Self::new(file, start_line, end_line, EditOp::Replace, payload)
    }

    /// Insert `payload` before `line`.
    pub fn insert(
        file: impl Into<PathBuf>,
        line: u32,
        payload: impl Into<String>,
    ) -> Result<Self, PatchError> {
        Self::new(file, line, line, EditOp::Insert, payload)
    }

    pub fn delete(
        file: impl Into<PathBuf>,
        start_line: u32,
        end_line: u32,
    ) -> Result<Self, PatchError> {
        Self::new(file, start_line, end_line, EditOp::Delete, String::new())
    }

    /// Two edits overlap iff they touch the same file and their line
    /// ranges intersect.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.file == other.file
            && self.start_line.max(other.start_line) <= self.end_line.min(other.end_line)
    }

    /// Lines this edit accounts for under budget math: replace/delete
    /// span their range; insert counts payload lines.
    pub fn line_count(&self) -> u64 {
        match self.op {
            EditOp::Replace | EditOp::Delete => u64::from(self.end_line - self.start_line + 1),
            EditOp::Insert => self.payload.matches('\n').count() as u64 + 1,
        }
    }
}

/// First pair of intersecting edits in the list, if any.
pub fn find_overlap(edits: &[Edit]) -> Option<(usize, usize)> {
    for (i, a) in edits.iter().enumerate() {
        for (j, b) in edits.iter().enumerate().skip(i + 1) {
            if a.overlaps(b) {
                return Some((i, j));
            }
        }
    }
    None
}

/// True when no two edits in the list intersect.
pub fn validate_non_overlapping(edits: &[Edit]) -> bool {
    find_overlap(edits).is_none()
}

// ── Edit plans ─────────────────────────────────────────────────────

/// An ordered set of edits addressing one or more findings.
///
/// Synthesized fresh each run; never persisted directly — receipts and
/// journal entries capture the effect of applying one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditPlan {
    /// Content-derived stable identifier.
    pub id: String,
    pub findings: Vec<Finding>,
    pub edits: Vec<Edit>,
    /// Free-text claims the plan makes (e.g. "AST structure preserved").
    pub invariants: Vec<String>,
    /// Base risk score in [0, 1].
    pub estimated_risk: f64,
    /// Pack cohesion when this plan was synthesized from a pack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cohesion: Option<f64>,
}

impl EditPlan {
    /// Derive a plan ID from the sorted stable IDs of its findings.
    pub fn derive_id(prefix: &str, findings: &[Finding]) -> String {
        let mut ids: Vec<String> = findings.iter().map(Finding::stable_id).collect();
        ids.sort_unstable();
        let material = format!("{prefix}:{}", ids.join(","));
        sha256_hex(material.as_bytes())[..16].to_string()
    }

    pub fn new(
        findings: Vec<Finding>,
        edits: Vec<Edit>,
        invariants: Vec<String>,
        estimated_risk: f64,
    ) -> Self {
        let id = Self::derive_id("plan", &findings);
        Self {
            id,
            findings,
            edits,
            invariants,
            estimated_risk,
            cohesion: None,
        }
    }

    /// Sorted set of files this plan touches.
    pub fn files(&self) -> std::collections::BTreeSet<&Path> {
        self.edits.iter().map(|e| e.file.as_path()).collect()
    }

    /// Total line budget this plan consumes.
    pub fn line_count(&self) -> u64 {
        self.edits.iter().map(Edit::line_count).sum()
    }

    /// Rule IDs this plan addresses, deduplicated and sorted.
    pub fn rules(&self) -> Vec<&str> {
        let mut rules: Vec<&str> = self.findings.iter().map(|f| f.rule.as_str()).collect();
        rules.sort_unstable();
        rules.dedup();
        rules
    }
}

// ── Receipts ───────────────────────────────────────────────────────

/// Audit record for one applied edit. Immutable; also consulted for
/// idempotency (same before-hash on a later run implies no-op).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub plan_id: String,
    pub file: PathBuf,
    /// Raw 64-char lowercase hex SHA-256 of the pre-edit content.
    pub before_hash: String,
    /// Raw 64-char lowercase hex SHA-256 of the post-edit content.
    pub after_hash: String,
    pub parse_valid: bool,
    pub invariants_met: bool,
    pub estimated_risk: f64,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

// ── Tests ──────────────────────────────────────────────────────────
