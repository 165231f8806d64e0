//! Repair engine — when a multi-edit plan fails the guard as a whole,
//! isolate the failing edits by binary search over index ranges and
//! salvage the largest safe subset.
//!
//! The search assumes edit failures are independent and attributable:
//! no edit fails only in combination with another. Pathological inputs
//! violate that assumption; they degrade to "revert everything",
//! flagged distinctly, never to silently applying broken content.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::guard::{Guard, GuardType};
use crate::patch::apply_edit_subset;
use crate::types::Edit;

/// How an isolation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    /// All edits passed; nothing to repair.
    Clean,
    /// A non-empty safe subset was found and verified.
    Partial,
    /// Every edit failed individually; nothing salvageable.
    Irreparable,
    /// The computed safe subset failed its sanity re-check — the
    /// independence assumption does not hold for this plan. Original
    /// content stands.
    BinarySearchError,
}

/// Outcome of isolating a failing plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairReport {
    pub status: RepairStatus,
    pub total_edits: usize,
    /// Indices (into the plan's edit list) proven safe.
    pub safe_indices: Vec<usize>,
    /// Indices isolated as failing.
    pub failed_indices: Vec<usize>,
    /// Human-readable reason derived from the guard's error list.
    pub failure_reason: Option<String>,
    /// Canned remediation suggestions keyed by the failing guard type.
    pub remediation: Vec<String>,
    /// Content with the safe subset applied; `None` unless `Partial`
    /// or `Clean`.
    pub repaired_content: Option<String>,
}

impl RepairReport {
    /// Content that should end up on disk: the repaired text when a
    /// safe subset exists, the untouched original otherwise.
    pub fn surviving_content<'a>(&'a self, original: &'a str) -> &'a str {
        self.repaired_content.as_deref().unwrap_or(original)
    }
}

/// Isolate the failing edits of a plan against one file's content.
///
/// `edits` must be sorted by line and non-overlapping (plan
/// invariants). Verification runs with the same strictness the plan
/// was gated with.
pub fn isolate(
    guard: &mut Guard,
    file: &Path,
    original: &str,
    edits: &[Edit],
    strict: bool,
) -> Result<RepairReport> {
    let all: Vec<usize> = (0..edits.len()).collect();

    // Whole plan first: the common case is full success.
    let full = check_subset(guard, file, original, edits, &all, strict)?;
    if full.passed {
        return Ok(RepairReport {
            status: RepairStatus::Clean,
            total_edits: edits.len(),
            safe_indices: all,
            failed_indices: Vec::new(),
            failure_reason: None,
            remediation: Vec::new(),
            repaired_content: full.content,
        });
    }
    let failure_reason = full.reason;
    let remediation = full
        .guard_type
        .map(remediation_for)
        .unwrap_or_default();

    // Binary search over index ranges into the immutable edit slice.
    let mut failed = Vec::new();
    bisect(guard, file, original, edits, 0, edits.len(), strict, &mut failed)?;
    failed.sort_unstable();
    failed.dedup();

    let safe: Vec<usize> = (0..edits.len()).filter(|i| !failed.contains(i)).collect();

    if safe.is_empty() {
        return Ok(RepairReport {
            status: RepairStatus::Irreparable,
            total_edits: edits.len(),
            safe_indices: safe,
            failed_indices: failed,
            failure_reason,
            remediation,
            repaired_content: None,
        });
    }

    // Sanity re-check: the safe subset must pass on its own.
    let salvage = check_subset(guard, file, original, edits, &safe, strict)?;
    if salvage.passed {
        tracing::debug!(
            file = %file.display(),
            safe = safe.len(),
            failed = failed.len(),
            "repair salvaged a partial edit set"
        );
        Ok(RepairReport {
            status: RepairStatus::Partial,
            total_edits: edits.len(),
            safe_indices: safe,
            failed_indices: failed,
            failure_reason,
            remediation,
            repaired_content: salvage.content,
        })
    } else {
        tracing::warn!(
            file = %file.display(),
            "safe subset failed its re-check; edit failures are not independent"
        );
        Ok(RepairReport {
            status: RepairStatus::BinarySearchError,
            total_edits: edits.len(),
            safe_indices: Vec::new(),
            failed_indices: failed,
            failure_reason,
            remediation,
            repaired_content: None,
        })
    }
}

struct SubsetCheck {
    passed: bool,
    content: Option<String>,
    reason: Option<String>,
    guard_type: Option<GuardType>,
}

fn check_subset(
    guard: &mut Guard,
    file: &Path,
    original: &str,
    edits: &[Edit],
    indices: &[usize],
    strict: bool,
) -> Result<SubsetCheck> {
    // An edit set that does not even apply is treated as a failed
    // parse-level verdict for isolation purposes.
    let candidate = match apply_edit_subset(original, edits, indices) {
        Ok(content) => content,
        Err(e) => {
            return Ok(SubsetCheck {
                passed: false,
                content: None,
                reason: Some(e.to_string()),
                guard_type: Some(GuardType::Parse),
            });
        }
    };
    let verdict = guard.verify(file, original, &candidate, strict)?;
    Ok(SubsetCheck {
        passed: verdict.passed,
        content: verdict.passed.then_some(candidate),
        reason: (!verdict.errors.is_empty()).then(|| verdict.errors.join("; ")),
        guard_type: verdict.guard_type,
    })
}

/// Recurse into `[lo, hi)`, halving until failing singletons are found.
#[allow(clippy::too_many_arguments)]
fn bisect(
    guard: &mut Guard,
    file: &Path,
    original: &str,
    edits: &[Edit],
    lo: usize,
    hi: usize,
    strict: bool,
    failed: &mut Vec<usize>,
) -> Result<()> {
    if lo >= hi {
        return Ok(());
    }
    let indices: Vec<usize> = (lo..hi).collect();
    let check = check_subset(guard, file, original, edits, &indices, strict)?;
    if check.passed {
        return Ok(());
    }
    if hi - lo == 1 {
        failed.push(lo);
        return Ok(());
    }
    let mid = lo + (hi - lo) / 2;
    bisect(guard, file, original, edits, lo, mid, strict, failed)?;
    bisect(guard, file, original, edits, mid, hi, strict, failed)?;
    Ok(())
}

fn remediation_for(guard_type: GuardType) -> Vec<String> {
    match guard_type {
        GuardType::Parse => vec![
            "the edit produces invalid Python; regenerate its payload".to_string(),
            "check for unbalanced brackets or indentation in the replacement text".to_string(),
        ],
        GuardType::AstEquiv => vec![
            "the edit changes program structure; review it manually".to_string(),
            "if the change is intentional, run the owning rule with relaxed verification"
                .to_string(),
        ],
        GuardType::CstApply => {
            vec!["parser round-trip instability; please report this as a bug".to_string()]
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::apply_edit_subset;

    const SRC: &str = "a = 1\nb = 2\nc = 3\nd = 4\n";

    fn guard() -> Guard {
        Guard::new().unwrap()
    }

    fn replace(line: u32, payload: &str) -> Edit {
        Edit::replace("t.py", line, line, payload).unwrap()
    }

    #[test]
    fn clean_plan_needs_no_repair() {
        let edits = vec![replace(1, "a = 1  # same"), replace(3, "c = 3  # same")];
        let report = isolate(&mut guard(), Path::new("t.py"), SRC, &edits, true).unwrap();
        assert_eq!(report.status, RepairStatus::Clean);
        assert_eq!(report.safe_indices, vec![0, 1]);
        assert!(report.failed_indices.is_empty());
    }

    #[test]
    fn isolates_single_malformed_edit() {
        // 4 edits, index 2 inserts a syntax error.
        let edits = vec![
            replace(1, "a = 1  # ok"),
            replace(2, "b = 2  # ok"),
            replace(3, "c = = broken"),
            replace(4, "d = 4  # ok"),
        ];
        let report = isolate(&mut guard(), Path::new("t.py"), SRC, &edits, true).unwrap();
        assert_eq!(report.status, RepairStatus::Partial);
        assert_eq!(report.failed_indices, vec![2]);
        assert_eq!(report.safe_indices, vec![0, 1, 3]);
        assert!(report.failure_reason.is_some());
        assert!(!report.remediation.is_empty());

        // Repair subset validity: exactly the safe subset passes.
        let expected = apply_edit_subset(SRC, &edits, &[0, 1, 3]).unwrap();
        assert_eq!(report.repaired_content.as_deref(), Some(expected.as_str()));
        let verdict = guard()
            .verify(Path::new("t.py"), SRC, &expected, true)
            .unwrap();
        assert!(verdict.passed);
    }

    #[test]
    fn isolates_multiple_failures_across_halves() {
        let edits = vec![
            replace(1, "a = ("),
            replace(2, "b = 2  # ok"),
            replace(3, "c = 3  # ok"),
            replace(4, "d = )"),
        ];
        let report = isolate(&mut guard(), Path::new("t.py"), SRC, &edits, true).unwrap();
        assert_eq!(report.status, RepairStatus::Partial);
        assert_eq!(report.failed_indices, vec![0, 3]);
        assert_eq!(report.safe_indices, vec![1, 2]);
    }

    #[test]
    fn all_bad_edits_are_irreparable() {
        let edits = vec![replace(1, "a = ="), replace(2, "b ) 2")];
        let report = isolate(&mut guard(), Path::new("t.py"), SRC, &edits, true).unwrap();
        assert_eq!(report.status, RepairStatus::Irreparable);
        assert!(report.repaired_content.is_none());
        assert_eq!(report.surviving_content(SRC), SRC);
    }

    #[test]
    fn strict_mode_isolates_semantic_drift() {
        // Comment-only edits are safe; a value change is not (strict).
        let edits = vec![
            replace(1, "a = 1  # note"),
            replace(2, "b = 99"),
            replace(3, "c = 3  # note"),
        ];
        let report = isolate(&mut guard(), Path::new("t.py"), SRC, &edits, true).unwrap();
        assert_eq!(report.status, RepairStatus::Partial);
        assert_eq!(report.failed_indices, vec![1]);
    }

    #[test]
    fn relaxed_mode_accepts_semantic_change() {
        let edits = vec![replace(2, "b = 99")];
        let report = isolate(&mut guard(), Path::new("t.py"), SRC, &edits, false).unwrap();
        assert_eq!(report.status, RepairStatus::Clean);
    }

    #[test]
    fn unapplicable_edit_is_isolated_like_a_parse_failure() {
        let edits = vec![replace(1, "a = 1  # ok"), replace(99, "zzz")];
        let report = isolate(&mut guard(), Path::new("t.py"), SRC, &edits, true).unwrap();
        assert_eq!(report.status, RepairStatus::Partial);
        assert_eq!(report.failed_indices, vec![1]);
    }
}
