//! Error taxonomy of the snapshot engine.
//!
//! - Parse: malformed snapshot-file text, carries the 1-based line.
//! - Consistency: one location written with two different values, or a literal
//!   whose encode/parse pair did not round-trip.
//! - ModeViolation: a write the current mode forbids.
//! - SnapshotMismatch / SnapshotNotFound: the ordinary assertion failures.
//! - RewriteScan: the source rewriter could not find or delimit a literal.
//! - Lifecycle: the runner called hooks out of order.
//!
//! Pure modules return `selfie::error::Result`. Orchestration layers wrap these into
//! `anyhow::Error`; use `downcast_ref::<SelfieError>()` to recover the kind.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelfieError {
    #[error("L{line}:{message}")]
    Parse { line: usize, message: String },

    #[error("{0}")]
    Consistency(String),

    #[error("{0}")]
    ModeViolation(String),

    #[error("{message}\n--- expected ---\n{expected}--- actual ---\n{actual}")]
    SnapshotMismatch {
        message: String,
        expected: String,
        actual: String,
    },

    #[error("{message}")]
    SnapshotNotFound { message: String, file: PathBuf },

    #[error("{0}")]
    RewriteScan(String),

    #[error("{0}")]
    Lifecycle(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SelfieError>;

impl SelfieError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        SelfieError::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        SelfieError::InvalidArgument(message.into())
    }

    /// Short machine-friendly name of the kind (used by the CLI's JSON output).
    pub fn kind(&self) -> &'static str {
        match self {
            SelfieError::Parse { .. } => "parse",
            SelfieError::Consistency(_) => "consistency",
            SelfieError::ModeViolation(_) => "mode_violation",
            SelfieError::SnapshotMismatch { .. } => "snapshot_mismatch",
            SelfieError::SnapshotNotFound { .. } => "snapshot_not_found",
            SelfieError::RewriteScan(_) => "rewrite_scan",
            SelfieError::Lifecycle(_) => "lifecycle",
            SelfieError::InvalidArgument(_) => "invalid_argument",
            SelfieError::Io(_) => "io",
        }
    }
}
