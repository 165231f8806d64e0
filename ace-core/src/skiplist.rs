//! Persisted skiplist — findings the user has dismissed, keyed by
//! `"{rule}:{stable_id}"` so entries survive line drift and reruns.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::types::Finding;

/// One dismissed finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipEntry {
    pub rule: String,
    pub stable_id: String,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// The full skiplist, persisted as sorted JSON at `.ace/skiplist.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Skiplist {
    entries: BTreeMap<String, SkipEntry>,
}

impl Skiplist {
    fn key(rule: &str, stable_id: &str) -> String {
        format!("{rule}:{stable_id}")
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_skipped(&self, finding: &Finding) -> bool {
        self.entries
            .contains_key(&Self::key(&finding.rule, &finding.stable_id()))
    }

    pub fn record(&mut self, finding: &Finding, reason: impl Into<String>) {
        let stable_id = finding.stable_id();
        self.entries.insert(
            Self::key(&finding.rule, &stable_id),
            SkipEntry {
                rule: finding.rule.clone(),
                stable_id,
                reason: reason.into(),
                recorded_at: Utc::now(),
            },
        );
    }

    pub fn entries(&self) -> impl Iterator<Item = &SkipEntry> {
        self.entries.values()
    }

    /// Load the skiplist; a missing file is an empty list, not an error.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Persist atomically via a temp file in the same directory,
    /// renamed over the target.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &text)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn finding() -> Finding {
        Finding::new("a.py", 3, "bare-except", Severity::Medium, "bare except")
    }

    #[test]
    fn record_then_match() {
        let mut list = Skiplist::default();
        assert!(!list.is_skipped(&finding()));
        list.record(&finding(), "reviewed, intentional");
        assert!(list.is_skipped(&finding()));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn matches_survive_line_drift() {
        let mut list = Skiplist::default();
        list.record(&finding(), "ok");
        let mut moved = finding();
        moved.line = 99;
        assert!(list.is_skipped(&moved));
    }

    #[test]
    fn different_rule_does_not_match() {
        let mut list = Skiplist::default();
        list.record(&finding(), "ok");
        let mut other = finding();
        other.rule = "trailing-whitespace".into();
        assert!(!list.is_skipped(&other));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ace").join("skiplist.json");

        let mut list = Skiplist::default();
        list.record(&finding(), "noise");
        list.save(&path).unwrap();

        let loaded = Skiplist::load(&path).unwrap();
        assert!(loaded.is_skipped(&finding()));
        // Trailing newline on persisted state.
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = Skiplist::load(&dir.path().join("nope.json")).unwrap();
        assert!(list.is_empty());
    }
}
