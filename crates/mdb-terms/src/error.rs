use thiserror::Error;

/// A failed snapshot fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("{source_name} unavailable: {message}")]
    Unavailable { source_name: String, message: String },

    #[error("{source_name} timed out after {elapsed_ms} ms")]
    Timeout { source_name: String, elapsed_ms: u64 },

    #[error("{source_name} returned an invalid snapshot: {message}")]
    Invalid { source_name: String, message: String },
}

impl SourceError {
    /// Outages and timeouts are transient; a malformed or missing snapshot is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Invalid { .. })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("term source unavailable for {model} after {attempts} attempt(s): {last}")]
    SourceUnavailable {
        model: String,
        attempts: u32,
        #[source]
        last: SourceError,
    },

    #[error("snapshot for {model} rejected: {error}")]
    InvalidSnapshot {
        model: String,
        #[source]
        error: SourceError,
    },

    #[error("snapshot is for model {found}, expected {expected}")]
    SnapshotMismatch { expected: String, found: String },

    #[error("reconciliation task for {model} did not complete")]
    TaskFailed { model: String },
}
