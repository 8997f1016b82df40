//! Error types for gitsync
//!
//! Every failure carries the job it happened to and the git operation that
//! was running, so callers can log it and decide whether to retry.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobId;

/// The git operation that was in flight when an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Clone,
    Open,
    Checkout,
    Fetch,
    Pull,
    Commit,
    Push,
    Write,
    Read,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Clone => "clone",
            Operation::Open => "open",
            Operation::Checkout => "checkout",
            Operation::Fetch => "fetch",
            Operation::Pull => "pull",
            Operation::Commit => "commit",
            Operation::Push => "push",
            Operation::Write => "write",
            Operation::Read => "read",
        };
        f.write_str(name)
    }
}

/// The main error type for gitsync operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Workspace Errors
    // ==========================================================================
    #[error("Workspace for job '{job_id}' could not be written at '{path}': {source}")]
    Filesystem {
        job_id: JobId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job '{job_id}' is not ready: {reason}")]
    Precondition { job_id: JobId, reason: String },

    // ==========================================================================
    // Remote Errors
    // ==========================================================================
    #[error("Remote unreachable during {operation} for job '{job_id}': {source}")]
    RemoteUnavailable {
        job_id: JobId,
        operation: Operation,
        #[source]
        source: git2::Error,
    },

    #[error("Branch '{branch}' of job '{job_id}' has diverged from the remote ({operation} rejected)")]
    BranchConflict {
        job_id: JobId,
        branch: String,
        operation: Operation,
    },

    #[error("Push of branch '{branch}' for job '{job_id}' was rejected: {message}")]
    PushRejected {
        job_id: JobId,
        branch: String,
        message: String,
    },

    #[error("Branch '{branch}' does not exist for job '{job_id}'")]
    BranchNotFound { job_id: JobId, branch: String },

    // ==========================================================================
    // Content Errors
    // ==========================================================================
    #[error("Content of '{path}' in job '{job_id}' changed: expected {expected}, found {}", .actual.as_deref().unwrap_or("no file"))]
    ContentConflict {
        job_id: JobId,
        path: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("File '{path}' not found on branch '{branch}' of job '{job_id}'")]
    FileNotFound {
        job_id: JobId,
        branch: String,
        path: String,
    },

    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    #[error("Invalid job id '{value}': {reason}")]
    InvalidJobId { value: String, reason: &'static str },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Invalid branch name '{branch}'")]
    InvalidBranch { branch: String },

    // ==========================================================================
    // Git Errors
    // ==========================================================================
    #[error("Git {operation} failed for job '{job_id}': {source}")]
    Git {
        job_id: JobId,
        operation: Operation,
        #[source]
        source: git2::Error,
    },

    // ==========================================================================
    // Configuration / Runtime
    // ==========================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type alias for gitsync operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a libgit2 error, classifying transport failures as remote
    /// unavailability.
    pub fn git(job_id: &JobId, operation: Operation, source: git2::Error) -> Self {
        let remote = matches!(
            source.class(),
            git2::ErrorClass::Net
                | git2::ErrorClass::Ssh
                | git2::ErrorClass::Http
                | git2::ErrorClass::Ssl
        );
        // A local-path remote that does not exist surfaces as NotFound on the
        // OS or repository class rather than as a network error.
        let unreachable_local =
            matches!(operation, Operation::Clone | Operation::Fetch | Operation::Push)
                && source.code() == git2::ErrorCode::NotFound
                && matches!(
                    source.class(),
                    git2::ErrorClass::Os | git2::ErrorClass::Repository
                );

        if remote || unreachable_local {
            Error::RemoteUnavailable {
                job_id: job_id.clone(),
                operation,
                source,
            }
        } else {
            Error::Git {
                job_id: job_id.clone(),
                operation,
                source,
            }
        }
    }

    pub fn filesystem(job_id: &JobId, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            job_id: job_id.clone(),
            path: path.into(),
            source,
        }
    }

    pub fn precondition(job_id: &JobId, reason: impl Into<String>) -> Self {
        Error::Precondition {
            job_id: job_id.clone(),
            reason: reason.into(),
        }
    }

    /// The job this error belongs to, if any
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Error::Filesystem { job_id, .. }
            | Error::Precondition { job_id, .. }
            | Error::RemoteUnavailable { job_id, .. }
            | Error::BranchConflict { job_id, .. }
            | Error::PushRejected { job_id, .. }
            | Error::BranchNotFound { job_id, .. }
            | Error::ContentConflict { job_id, .. }
            | Error::FileNotFound { job_id, .. }
            | Error::Git { job_id, .. } => Some(job_id),
            Error::InvalidJobId { .. }
            | Error::InvalidPath { .. }
            | Error::InvalidBranch { .. }
            | Error::Config { .. }
            | Error::Task(_) => None,
        }
    }

    /// Returns true if retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RemoteUnavailable { .. } | Error::BranchConflict { .. } | Error::Task(_)
        )
    }

    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Precondition { .. } => Some("Run a sync for the job before updating it"),
            Error::RemoteUnavailable { .. } => Some("Check the remote URL and credentials, then retry"),
            Error::BranchConflict { .. } => {
                Some("The remote moved; sync the job and retry the operation")
            }
            Error::ContentConflict { .. } => {
                Some("Read the current file content and resubmit with its checksum")
            }
            Error::InvalidJobId { .. } => {
                Some("Use only letters, numbers, underscores, and hyphens")
            }
            _ => None,
        }
    }
}

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<crate::validation::ValidationError> for Error {
    fn from(err: crate::validation::ValidationError) -> Self {
        use crate::validation::ValidationError;

        match err {
            ValidationError::InvalidIdentifier(value, reason) => {
                Error::InvalidJobId { value, reason }
            }
            ValidationError::TooLong(value, _max) => Error::InvalidJobId {
                value,
                reason: "exceeds maximum length",
            },
            ValidationError::Empty => Error::InvalidJobId {
                value: String::new(),
                reason: "cannot be empty",
            },
            ValidationError::Reserved(value) => Error::InvalidJobId {
                value,
                reason: "is a reserved name",
            },
            ValidationError::InvalidPath(path, reason) => Error::InvalidPath { path, reason },
            ValidationError::InvalidBranch(branch) => Error::InvalidBranch { branch },
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobId {
        JobId::parse("42").unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = Error::BranchConflict {
            job_id: job(),
            branch: "main".to_string(),
            operation: Operation::Push,
        };
        assert_eq!(
            err.to_string(),
            "Branch 'main' of job '42' has diverged from the remote (push rejected)"
        );
    }

    #[test]
    fn test_network_errors_are_remote_unavailable() {
        let source = git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Net,
            "failed to connect",
        );
        let err = Error::git(&job(), Operation::Fetch, source);
        assert!(matches!(err, Error::RemoteUnavailable { operation: Operation::Fetch, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_git_errors_keep_context() {
        let source = git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Index,
            "index locked",
        );
        let err = Error::git(&job(), Operation::Commit, source);
        assert!(matches!(err, Error::Git { .. }));
        assert_eq!(err.job_id().map(|id| id.as_str()), Some("42"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_content_conflict_without_file() {
        let err = Error::ContentConflict {
            job_id: job(),
            path: "a.txt".to_string(),
            expected: "abc".to_string(),
            actual: None,
        };
        assert!(err.to_string().ends_with("found no file"));
        assert!(err.suggestion().is_some());
    }
}
