//! Error types for the bibsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and the
//! top-level [`SyncError`] unifies them for the orchestrator's callers.
//! User cancellation of conflict resolution is *not* an error anywhere in
//! this crate; it is reported as a normal value.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The path does not exist or is not inside a git repository.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// The file is not under the repository working tree.
    #[error("'{0}' is not inside the repository working tree")]
    OutsideWorkTree(String),

    /// A ref (branch, HEAD, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// The current branch has no upstream tracking ref.
    #[error("branch '{0}' has no upstream tracking ref")]
    NoUpstream(String),

    /// The working tree matches HEAD; there is nothing to commit.
    #[error("nothing to commit: working tree matches HEAD")]
    NothingToCommit,

    /// Push was rejected by the remote (e.g. non-fast-forward).
    #[error("git push rejected for branch '{branch}': {detail}")]
    PushRejected { branch: String, detail: String },

    /// Network / transport failure during fetch or push, including bounded
    /// timeouts.
    #[error("git network error: {0}")]
    Network(String),

    /// Any other `git2` failure: malformed refs, corrupt objects, etc.
    #[error("git protocol error: {0}")]
    Protocol(#[source] git2::Error),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<git2::Error> for GitError {
    /// Classify a raw `git2` error. Transport-level failures become
    /// [`GitError::Network`] so callers can tell them apart from repository
    /// corruption; everything else is a protocol error.
    fn from(err: git2::Error) -> Self {
        use git2::ErrorClass;
        match err.class() {
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh => {
                GitError::Network(err.message().to_string())
            }
            _ => GitError::Protocol(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and secret resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found or unreadable.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A referenced environment variable is not set.
    #[error("required environment variable '{0}' is not set")]
    EnvVarMissing(String),
}

// ---------------------------------------------------------------------------
// Top-level sync errors
// ---------------------------------------------------------------------------

/// Unified error type for synchronization operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The database file is not under version control.
    #[error("no git repository found for '{0}'")]
    NoRepository(String),

    /// The database has no on-disk path association.
    #[error("database has no associated file on disk")]
    NoAssociatedFile,

    /// Underlying git failure (network, protocol, push rejection, ...).
    #[error(transparent)]
    Git(#[from] GitError),

    /// The document port failed to parse or serialize the database.
    #[error("document error: {0}")]
    Document(String),

    /// Document read/write I/O failure.
    #[error("document I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = GitError::RepositoryNotFound("/tmp/refs.bib".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/refs.bib'");

        let err = GitError::PushRejected {
            branch: "main".into(),
            detail: "non-fast-forward".into(),
        };
        assert!(err.to_string().contains("non-fast-forward"));

        let err = SyncError::NoAssociatedFile;
        assert!(err.to_string().contains("no associated file"));
    }

    #[test]
    fn git2_network_class_maps_to_network() {
        let raw = git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Net,
            "connection refused",
        );
        assert!(matches!(GitError::from(raw), GitError::Network(_)));

        let raw = git2::Error::new(
            git2::ErrorCode::NotFound,
            git2::ErrorClass::Reference,
            "ref not found",
        );
        assert!(matches!(GitError::from(raw), GitError::Protocol(_)));
    }

    #[test]
    fn sync_error_preserves_git_kind() {
        let err: SyncError = GitError::NothingToCommit.into();
        assert!(matches!(err, SyncError::Git(GitError::NothingToCommit)));
    }
}
