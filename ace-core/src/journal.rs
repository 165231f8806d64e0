//! Append-only journal — the durable, replayable log of file
//! modifications for one run.
//!
//! One JSONL file per `run_id`. Every record is flushed and fsynced
//! before the append returns: a crash mid-run loses at most the
//! in-flight record, never corrupts prior ones. The journal file is
//! opened with exclusive create, so two writers for the same run ID
//! cannot interleave.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JournalError;
use crate::types::sha256_hex;

/// One journal record. Entries for the same file are correlated by
/// path and chronological order within a run's journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    /// Before-state snapshot, written before the file is touched.
    Intent {
        file: PathBuf,
        before_sha: String,
        before_size: u64,
        /// Full original content; what a revert restores.
        before_content: String,
        rules: Vec<String>,
        plan_id: String,
        ts: DateTime<Utc>,
    },
    /// After-state record, written once the guard accepted the edit.
    Success {
        file: PathBuf,
        after_sha: String,
        after_size: u64,
        receipt_id: String,
        ts: DateTime<Utc>,
    },
    /// A reverted modification, with a human-readable reason.
    Revert {
        file: PathBuf,
        from_sha: String,
        to_sha: String,
        reason: String,
        ts: DateTime<Utc>,
    },
}

impl JournalRecord {
    pub fn file(&self) -> &Path {
        match self {
            Self::Intent { file, .. } | Self::Success { file, .. } | Self::Revert { file, .. } => {
                file
            }
        }
    }
}

/// Writer handle for one run's journal. Owned exclusively; dropping it
/// closes the log.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    run_id: String,
}

impl Journal {
    /// Create the journal for `run_id` under `dir` (usually
    /// `.ace/journals`). Fails if a journal for this run already
    /// exists.
    pub fn create(dir: &Path, run_id: &str) -> Result<Self, JournalError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{run_id}.jsonl"));
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(JournalError::AlreadyExists {
                    run_id: run_id.to_string(),
                    path: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            file,
            run_id: run_id.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append one record, durably. Write failures are fatal for the
    /// run: an intent that cannot be recorded must not proceed.
    pub fn append(&mut self, record: &JournalRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn log_intent(
        &mut self,
        file: &Path,
        before_content: &str,
        rules: Vec<String>,
        plan_id: &str,
    ) -> Result<(), JournalError> {
        self.append(&JournalRecord::Intent {
            file: file.to_path_buf(),
            before_sha: sha256_hex(before_content.as_bytes()),
            before_size: before_content.len() as u64,
            before_content: before_content.to_string(),
            rules,
            plan_id: plan_id.to_string(),
            ts: Utc::now(),
        })
    }

    pub fn log_success(
        &mut self,
        file: &Path,
        after_content: &str,
        receipt_id: &str,
    ) -> Result<(), JournalError> {
        self.append(&JournalRecord::Success {
            file: file.to_path_buf(),
            after_sha: sha256_hex(after_content.as_bytes()),
            after_size: after_content.len() as u64,
            receipt_id: receipt_id.to_string(),
            ts: Utc::now(),
        })
    }

    pub fn log_revert(
        &mut self,
        file: &Path,
        from_sha: &str,
        to_sha: &str,
        reason: &str,
    ) -> Result<(), JournalError> {
        self.append(&JournalRecord::Revert {
            file: file.to_path_buf(),
            from_sha: from_sha.to_string(),
            to_sha: to_sha.to_string(),
            reason: reason.to_string(),
            ts: Utc::now(),
        })
    }
}

/// Read every record of a journal file, in write order.
pub fn read_journal(path: &Path) -> Result<Vec<JournalRecord>, JournalError> {
    if !path.exists() {
        return Err(JournalError::NotFound(path.display().to_string()));
    }
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: JournalRecord =
            serde_json::from_str(&line).map_err(|e| JournalError::Corrupt {
                line: idx + 1,
                message: e.to_string(),
            })?;
        records.push(record);
    }
    Ok(records)
}

/// Everything needed to restore one completed modification.
#[derive(Debug, Clone)]
pub struct RevertContext {
    pub file: PathBuf,
    pub plan_id: String,
    /// Hash the restore must land on.
    pub original_sha: String,
    pub original_content: String,
    /// Hash recorded when the edit succeeded.
    pub applied_sha: String,
}

impl RevertContext {
    /// Write the original bytes back and verify the restoration lands
    /// on the original hash.
    pub fn restore(&self) -> Result<(), JournalError> {
        std::fs::write(&self.file, &self.original_content)?;
        let restored = std::fs::read(&self.file)?;
        let actual = sha256_hex(&restored);
        if actual != self.original_sha {
            return Err(JournalError::HashMismatch {
                file: self.file.display().to_string(),
                expected: self.original_sha.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Replay result: revertible modifications plus the intents that never
/// completed.
#[derive(Debug, Default)]
pub struct RevertPlan {
    /// Most recent modification first — ordering matters when edits in
    /// one run touched dependent regions.
    pub contexts: Vec<RevertContext>,
    /// Files with a bare intent (crash before success). On-disk state
    /// is of unknown provenance; left for a human to inspect.
    pub incomplete: Vec<PathBuf>,
}

/// Replay a journal and pair each intent with its later success.
pub fn build_revert_plan(path: &Path) -> Result<RevertPlan, JournalError> {
    let records = read_journal(path)?;

    let mut pending: Vec<(PathBuf, String, String, String)> = Vec::new();
    let mut completed: Vec<RevertContext> = Vec::new();

    for record in records {
        match record {
            JournalRecord::Intent {
                file,
                before_sha,
                before_content,
                plan_id,
                ..
            } => {
                pending.push((file, before_sha, before_content, plan_id));
            }
            JournalRecord::Success {
                file, after_sha, ..
            } => {
                // Pair with the earliest outstanding intent for the file.
                if let Some(pos) = pending.iter().position(|(f, ..)| *f == file) {
                    let (file, original_sha, original_content, plan_id) = pending.remove(pos);
                    completed.push(RevertContext {
                        file,
                        plan_id,
                        original_sha,
                        original_content,
                        applied_sha: after_sha,
                    });
                }
            }
            JournalRecord::Revert { file, .. } => {
                // Already restored during the run; nothing to revert.
                pending.retain(|(f, ..)| *f != file);
            }
        }
    }

    completed.reverse();
    Ok(RevertPlan {
        contexts: completed,
        incomplete: pending.into_iter().map(|(f, ..)| f).collect(),
    })
}

// ── Tests ──────────────────────────────────────────────────────────
