//! Error types for the ctxsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! None of these escape the public [`SyncEngine`](crate::SyncEngine)
//! operations: the orchestrator folds them into outcome values with a
//! `status` field.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, remote-tracking branch, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// The configured remote does not exist in the repository.
    #[error("no remote named '{0}' is configured")]
    RemoteNotFound(String),

    /// Push was rejected (e.g. non-fast-forward).
    #[error("git push rejected for branch '{branch}': {detail}")]
    PushRejected { branch: String, detail: String },

    /// A checkout would overwrite uncommitted working-tree changes.
    #[error("checkout would overwrite local changes: {0}")]
    CheckoutConflict(String),

    /// HEAD is detached or unborn where a branch was required.
    #[error("HEAD does not point at a branch")]
    DetachedHead,

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Errors from the sync orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A merge is waiting for resolution and blocks the requested operation.
    #[error("merge {conflict_id} is pending; finalize or abort it first")]
    MergeInProgress { conflict_id: String },

    /// The store has uncommitted changes and auto-commit before pull is off.
    #[error("store has uncommitted changes; commit them before pulling")]
    UncommittedChanges,

    /// Reading or writing a store document failed.
    #[error("store I/O error on '{path}': {source}")]
    StoreIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The pending-conflict sidecar could not be written.
    #[error("failed to persist pending conflicts: {0}")]
    PendingWrite(String),

    /// Underlying Git error during sync.
    #[error("sync Git error: {0}")]
    GitError(#[from] GitError),

    /// Underlying conflict-handling error during sync.
    #[error("sync conflict error: {0}")]
    ConflictError(#[from] ConflictError),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from the merge / conflict resolution subsystem.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// A document could not be parsed for a structured merge.
    #[error("invalid {kind} document: {detail}")]
    InvalidDocument { kind: String, detail: String },

    /// The interactive prompt failed (no terminal, I/O error).
    #[error("interactive prompt failed: {0}")]
    PromptFailed(String),

    /// Serializing or deserializing a conflict report failed.
    #[error("conflict report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = GitError::RemoteNotFound("origin".into());
        assert_eq!(err.to_string(), "no remote named 'origin' is configured");

        let err = SyncError::MergeInProgress {
            conflict_id: "abc".into(),
        };
        assert!(err.to_string().contains("abc"));

        let err = ConflictError::InvalidDocument {
            kind: "json".into(),
            detail: "expected an object".into(),
        };
        assert_eq!(err.to_string(), "invalid json document: expected an object");
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let git_err = GitError::DetachedHead;
        let core_err: CoreError = git_err.into();
        assert!(matches!(core_err, CoreError::Git(_)));

        let sync_err: SyncError = GitError::DetachedHead.into();
        assert!(matches!(sync_err, SyncError::GitError(GitError::DetachedHead)));
    }

    #[test]
    fn test_report_serialization_error_reaches_sync_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let sync_err: SyncError = ConflictError::from(json_err).into();
        assert!(matches!(
            sync_err,
            SyncError::ConflictError(ConflictError::Serialization(_))
        ));
        assert!(sync_err.to_string().contains("conflict report serialization error"));

        let err = GitError::CheckoutConflict("1 conflict prevents checkout".into());
        assert!(err.to_string().starts_with("checkout would overwrite local changes"));
    }
}
