//! The error taxonomy shared by storage backends and the task framework.
//!
//! This is deliberately a closed, small set of variants (spec §7) rather than
//! one error type per backend — callers match on *kind*, not on which crate
//! raised it, so `ssh2::Error`, `aws_sdk_s3` service errors and `std::io::Error`
//! all fold down into the same handful of cases before they reach a task's
//! per-item result bookkeeping.

use std::fmt;

/// Design-level error kinds from spec §7.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("cancelled")]
    Cancelled,

    #[error("conflict: {0} already exists")]
    Conflict(String),

    #[error("backend capability unavailable: {0}")]
    BackendUnavailable(String),

    #[error("internal error: {0}")]
    Bug(String),
}

impl CoreError {
    /// Short tag used in status-bar messages and log records (spec §7).
    pub fn kind_tag(&self) -> &'static str {
        match self {
            CoreError::InvalidArgument(_) => "InvalidArgument",
            CoreError::PreconditionFailed(_) => "PreconditionFailed",
            CoreError::NotFound(_) => "NotFound",
            CoreError::PermissionDenied(_) => "PermissionDenied",
            CoreError::Io(_) => "Io",
            CoreError::Network(_) => "Network",
            CoreError::Cancelled => "Cancelled",
            CoreError::Conflict(_) => "Conflict",
            CoreError::BackendUnavailable(_) => "BackendUnavailable",
            CoreError::Bug(_) => "Bug",
        }
    }

    pub fn not_found(path: impl fmt::Display) -> Self {
        CoreError::NotFound(path.to_string())
    }

    pub fn from_io(path: impl fmt::Display, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied(path.to_string()),
            _ => CoreError::Io(err),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
