/// Top-level ACE error type.
///
/// All fallible operations in `ace-core` return [`Result<T, AceError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
///
/// Guard *verdicts* are not errors — a failed verification is an
/// ordinary [`crate::guard::GuardResult`] value. Only engine-level
/// failures (grammar loading, parser cancellation) surface here.
#[derive(thiserror::Error, Debug)]
pub enum AceError {
    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from the append-only journal. Fatal for the run: an intent
    /// that cannot be durably recorded must not proceed to apply.
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    /// Verification engine failure (not a verdict).
    #[error("Guard engine error: {0}")]
    Guard(#[from] GuardEngineError),

    /// Malformed edit application (bad range, out-of-bounds line).
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    /// Error walking or reading the analysis target.
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Error reading or writing persisted state (skiplist, receipts)
    /// or the working tree during apply.
    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Errors in ACE configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors from the append-only journal.
#[derive(thiserror::Error, Debug)]
pub enum JournalError {
    /// A journal for this run ID already exists — refuses to interleave
    /// writes from two runs.
    #[error("Journal already exists for run {run_id}: {path}")]
    AlreadyExists { run_id: String, path: String },

    /// No journal found for the requested run.
    #[error("Journal not found: {0}")]
    NotFound(String),

    /// Filesystem I/O failure writing or syncing a record.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A journal line could not be decoded.
    #[error("Corrupt journal record at line {line}: {message}")]
    Corrupt { line: usize, message: String },

    /// Record serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Restored content does not hash to the recorded original.
    #[error("Restore hash mismatch for {file}: expected {expected}, got {actual}")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },
}

/// Engine-level failures from the tree-sitter verification layer.
#[derive(thiserror::Error, Debug)]
pub enum GuardEngineError {
    /// The Python grammar could not be loaded into the parser.
    #[error("Grammar error: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    /// The parser returned no tree (cancelled or resource-limited).
    #[error("Parser produced no tree for {0}")]
    NoTree(String),

    /// Filesystem I/O failure reading before-content.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors applying textual edits to source content.
#[derive(thiserror::Error, Debug)]
pub enum PatchError {
    /// `start_line > end_line` or a zero line number.
    #[error("Invalid edit range: {start}..{end}")]
    InvalidRange { start: u32, end: u32 },

    /// An edit addresses a line past the end of the file.
    #[error("Edit range {start}..{end} exceeds file length {len}")]
    OutOfBounds { start: u32, end: u32, len: usize },

    /// Two edits in the same application intersect.
    #[error("Overlapping edits at indices {0} and {1}")]
    Overlap(usize, usize),
}

/// Errors walking or reading the analysis target.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// An include/exclude glob pattern is malformed.
    #[error("Bad glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// Filesystem I/O error during the walk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reading or writing persisted state under `.ace/`.
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for `Result<T, AceError>`.
pub type Result<T> = std::result::Result<T, AceError>;
