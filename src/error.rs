use std::path::PathBuf;

/// Per-unit failure taxonomy.
///
/// Every variant is recoverable at the unit boundary — the batch never
/// aborts because one sidecar failed. Fatal errors (unreadable root
/// directory, bad flags) are raised through `anyhow` by the CLI instead.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// No media file in the sidecar's directory matches its title.
    #[error("no media file matches sidecar title {title:?}")]
    NoMatch { title: String },

    /// More than one media file matched; refusing to guess.
    #[error("sidecar title {title:?} matches {} files: {candidates:?}", candidates.len())]
    AmbiguousMatch {
        title: String,
        candidates: Vec<PathBuf>,
    },

    /// The file's extension and its byte signature disagree.
    #[error("{path}: extension says {expected}, byte signature does not match")]
    FormatMismatch { path: PathBuf, expected: &'static str },

    /// The container is recognizable but its metadata structures are not
    /// in an encoding this tool can safely rewrite. The file is left
    /// untouched.
    #[error("unsupported metadata encoding: {0}")]
    UnsupportedEncoding(String),

    /// The container's structure is invalid (truncated lengths, missing
    /// magic, box sizes running past end-of-stream).
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How a failure is classified in the run summary and exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Unit skipped; the run is still considered clean.
    Warning,
    /// Unit failed; the process exits non-zero.
    Error,
}

impl RestoreError {
    pub fn severity(&self) -> Severity {
        match self {
            RestoreError::NoMatch { .. }
            | RestoreError::AmbiguousMatch { .. }
            | RestoreError::FormatMismatch { .. }
            | RestoreError::UnsupportedEncoding(_) => Severity::Warning,
            RestoreError::MalformedContainer(_) | RestoreError::Io(_) => Severity::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;
