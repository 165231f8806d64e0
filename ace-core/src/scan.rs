//! Target scanner — walks the analysis root with the configured
//! include/exclude globs and runs every registered rule over each file.
//!
//! Analysis is parallel over files (rayon), then findings are re-sorted
//! by `(file, line, rule)` so parallelism is never observable in the
//! output. A detector failure or panic poisons one file's output for
//! one rule, never the run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ScanSection;
use crate::error::ScanError;
use crate::progress::ProgressReporter;
use crate::rules::RuleRegistry;
use crate::types::Finding;

/// Counters for one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub findings: usize,
    /// `"{file}: {rule}: {message}"` per detector failure.
    pub detector_errors: Vec<String>,
}

/// Resolve the file set for a scan: include globs under `root`, minus
/// excludes, deduplicated and sorted.
pub fn collect_files(root: &Path, scan: &ScanSection) -> Result<Vec<PathBuf>, ScanError> {
    let excludes: Vec<glob::Pattern> = scan
        .exclude_patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|source| ScanError::Pattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect::<Result<_, _>>()?;

    let mut files = Vec::new();
    for pattern in &scan.include_patterns {
        let full = root.join(pattern);
        let full = full.to_string_lossy();
        let paths = glob::glob(&full).map_err(|source| ScanError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        for entry in paths {
            let path = entry.map_err(|e| ScanError::Io(e.into()))?;
            if !path.is_file() {
                continue;
            }
            let rel = path.strip_prefix(root).unwrap_or(&path);
            if excludes.iter().any(|ex| ex.matches_path(rel)) {
                continue;
            }
            files.push(path);
        }
    }
    files.sort_unstable();
    files.dedup();
    Ok(files)
}

/// Run every registry rule over every matched file.
pub fn scan(
    root: &Path,
    scan_cfg: &ScanSection,
    registry: &RuleRegistry,
    reporter: &dyn ProgressReporter,
) -> Result<(Vec<Finding>, ScanStats), ScanError> {
    let files = collect_files(root, scan_cfg)?;
    reporter.start("analyzing", Some(files.len() as u64));

    let results: Vec<(Vec<Finding>, Vec<String>)> = files
        .par_iter()
        .map(|path| {
            let out = analyze_file(path, registry);
            reporter.advance(1);
            out
        })
        .collect();
    reporter.finish();

    let mut findings = Vec::new();
    let mut stats = ScanStats {
        files_scanned: files.len(),
        ..ScanStats::default()
    };
    for (file_findings, errors) in results {
        findings.extend(file_findings);
        stats.detector_errors.extend(errors);
    }

    // Deterministic output order regardless of rayon scheduling.
    findings.sort_by(|a, b| {
        (&a.file, a.line, &a.rule)
            .cmp(&(&b.file, b.line, &b.rule))
            .then_with(|| a.message.cmp(&b.message))
    });
    stats.findings = findings.len();

    tracing::debug!(
        files = stats.files_scanned,
        findings = stats.findings,
        errors = stats.detector_errors.len(),
        "scan complete"
    );
    Ok((findings, stats))
}

fn analyze_file(path: &Path, registry: &RuleRegistry) -> (Vec<Finding>, Vec<String>) {
    let mut findings = Vec::new();
    let mut errors = Vec::new();

    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            // Unreadable or non-UTF-8 files are reported, not fatal.
            errors.push(format!("{}: read: {e}", path.display()));
            return (findings, errors);
        }
    };

    for rule in registry.iter() {
        match catch_unwind(AssertUnwindSafe(|| rule.analyze(&source, path))) {
            Ok(Ok(mut rule_findings)) => findings.append(&mut rule_findings),
            Ok(Err(e)) => {
                tracing::warn!(file = %path.display(), rule = rule.id(), error = %e, "detector failed");
                errors.push(format!("{}: {}: {e}", path.display(), rule.id()));
            }
            Err(_) => {
                tracing::warn!(file = %path.display(), rule = rule.id(), "detector panicked");
                errors.push(format!("{}: {}: detector panicked", path.display(), rule.id()));
            }
        }
    }
    (findings, errors)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopReporter;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn finds_issues_across_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "try:\n    f()\nexcept:\n    pass\n");
        write(dir.path(), "pkg/b.py", "x = 1   \n");
        write(dir.path(), "notes.txt", "except:\n");

        let (findings, stats) = scan(
            dir.path(),
            &ScanSection::default(),
            &RuleRegistry::builtin(),
            &NoopReporter,
        )
        .unwrap();

        assert_eq!(stats.files_scanned, 2);
        let rules: Vec<&str> = findings.iter().map(|f| f.rule.as_str()).collect();
        assert!(rules.contains(&"bare-except"));
        assert!(rules.contains(&"trailing-whitespace"));
        assert!(stats.detector_errors.is_empty());
    }

    #[test]
    fn excludes_are_honored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "x = 1   \n");
        write(dir.path(), "venv/lib.py", "x = 1   \n");
        write(dir.path(), "__pycache__/c.py", "x = 1   \n");

        let files = collect_files(dir.path(), &ScanSection::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.py"));
    }

    #[test]
    fn output_order_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "z.py", "a = 1   \nb = 2   \n");
        write(dir.path(), "a.py", "c = 3   \n");

        let cfg = ScanSection::default();
        let registry = RuleRegistry::builtin();
        let (first, _) = scan(dir.path(), &cfg, &registry, &NoopReporter).unwrap();
        let (second, _) = scan(dir.path(), &cfg, &registry, &NoopReporter).unwrap();
        assert_eq!(first, second);
        let sorted_ok = first
            .windows(2)
            .all(|w| (&w[0].file, w[0].line) <= (&w[1].file, w[1].line));
        assert!(sorted_ok);
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ScanSection {
            include_patterns: vec!["[".into()],
            exclude_patterns: vec![],
        };
        assert!(matches!(
            collect_files(dir.path(), &cfg),
            Err(ScanError::Pattern { .. })
        ));
    }

    #[test]
    fn unreadable_file_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.py", "x = 1   \n");
        std::fs::write(dir.path().join("bad.py"), [0xff, 0xfe, 0x00]).unwrap();

        let (findings, stats) = scan(
            dir.path(),
            &ScanSection::default(),
            &RuleRegistry::builtin(),
            &NoopReporter,
        )
        .unwrap();
        assert!(!findings.is_empty());
        assert_eq!(stats.detector_errors.len(), 1);
        assert!(stats.detector_errors[0].contains("bad.py"));
    }
}
