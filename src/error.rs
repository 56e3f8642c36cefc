//! Error taxonomy for repository resolution and synchronization
//!
//! Every failure carries a kind, a human-readable message and, where one
//! exists, a remediation hint. Only [`SyncError::Transient`] is worth retrying.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for repodock operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the parser, path builder, engine and invocation surface
#[derive(Error, Debug)]
pub enum SyncError {
    /// Unparseable or disallowed repository reference
    #[error("invalid repository reference: {0}")]
    InvalidReference(String),

    /// Computed local path is not a strict descendant of the clone root
    #[error("path escapes clone root: {0}")]
    PathEscape(String),

    /// Target path exists but is not a git working copy
    #[error("not a git repository: {0}")]
    NotAVcsRepo(String),

    /// Existing clone's origin points at a different repository
    #[error("repository mismatch: {0}")]
    RepositoryMismatch(String),

    /// Fast-forward requested against a working copy with local changes
    #[error("working tree has uncommitted changes: {0}")]
    DirtyWorktree(String),

    /// Destructive reset requested while not on a named branch
    #[error("detached HEAD: {0}")]
    DetachedHead(String),

    /// Update mode outside `ff-only | fetch-only | reset-clean`
    #[error("unsupported update mode: {0}")]
    UnsupportedUpdateMode(String),

    /// The git binary exited non-zero
    #[error("git operation failed: {0}")]
    VcsOperationFailed(String),

    /// Timeout or network-class failure; callers may retry
    #[error("transient failure: {0}")]
    Transient(String),

    /// Caller-supplied argument set failed validation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Serializable discriminant of [`SyncError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidReference,
    PathEscape,
    NotAVcsRepo,
    RepositoryMismatch,
    DirtyWorktree,
    DetachedHead,
    UnsupportedUpdateMode,
    VcsOperationFailed,
    Transient,
    InvalidArgument,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidReference => "InvalidReference",
            ErrorKind::PathEscape => "PathEscape",
            ErrorKind::NotAVcsRepo => "NotAVcsRepo",
            ErrorKind::RepositoryMismatch => "RepositoryMismatch",
            ErrorKind::DirtyWorktree => "DirtyWorktree",
            ErrorKind::DetachedHead => "DetachedHead",
            ErrorKind::UnsupportedUpdateMode => "UnsupportedUpdateMode",
            ErrorKind::VcsOperationFailed => "VcsOperationFailed",
            ErrorKind::Transient => "Transient",
            ErrorKind::InvalidArgument => "InvalidArgument",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidReference(_) => ErrorKind::InvalidReference,
            SyncError::PathEscape(_) => ErrorKind::PathEscape,
            SyncError::NotAVcsRepo(_) => ErrorKind::NotAVcsRepo,
            SyncError::RepositoryMismatch(_) => ErrorKind::RepositoryMismatch,
            SyncError::DirtyWorktree(_) => ErrorKind::DirtyWorktree,
            SyncError::DetachedHead(_) => ErrorKind::DetachedHead,
            SyncError::UnsupportedUpdateMode(_) => ErrorKind::UnsupportedUpdateMode,
            SyncError::VcsOperationFailed(_) => ErrorKind::VcsOperationFailed,
            SyncError::Transient(_) => ErrorKind::Transient,
            SyncError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Remediation hint shown alongside the message
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            SyncError::InvalidReference(_) => Some(
                "use owner/repo, host/owner/repo, https://host/owner/repo, \
                 or an SSH reference with allow_ssh=true",
            ),
            SyncError::PathEscape(_) => None,
            SyncError::NotAVcsRepo(_) => {
                Some("move or remove the directory, or choose a different clone_root")
            }
            SyncError::RepositoryMismatch(_) => {
                Some("remove the existing clone or choose a different clone_root")
            }
            SyncError::DirtyWorktree(_) => Some(
                "commit or stash local changes, use update_mode=fetch-only, \
                 or use update_mode=reset-clean to discard them",
            ),
            SyncError::DetachedHead(_) => {
                Some("pass a branch name as ref, or use update_mode=fetch-only")
            }
            SyncError::UnsupportedUpdateMode(_) => {
                Some("update_mode must be one of ff-only, fetch-only, reset-clean")
            }
            SyncError::VcsOperationFailed(_) => None,
            SyncError::Transient(_) => Some("retry the operation"),
            SyncError::InvalidArgument(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from(self)
    }
}

/// Structured failure payload handed back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub retryable: bool,
}

impl From<&SyncError> for ErrorReport {
    fn from(err: &SyncError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            hint: err.hint().map(str::to_string),
            retryable: err.is_retryable(),
        }
    }
}
