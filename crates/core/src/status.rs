//! Point-in-time synchronization status.
//!
//! A [`StatusSnapshot`] describes the relation between the local branch tip
//! and its upstream tracking ref at one inspection point. Snapshots are
//! derived fresh on every call and never stored; "behind"/"diverged" are
//! only accurate immediately after a fetch, which is why merge decisions go
//! through [`StatusInspector::inspect_and_fetch`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::GitError;
use crate::git::client::GitClient;

/// Relation between the local branch tip and its upstream tracking ref.
/// Exactly one value holds at any inspection point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The path is not under version control.
    Untracked,
    /// Local tip equals the upstream tip.
    UpToDate,
    /// Local has commits the upstream lacks.
    Ahead,
    /// The upstream has commits local lacks.
    Behind,
    /// Both sides have unique commits.
    Diverged,
    /// The upstream has no commits (or no tracking ref exists yet).
    RemoteEmpty,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Untracked => write!(f, "untracked"),
            Self::UpToDate => write!(f, "up_to_date"),
            Self::Ahead => write!(f, "ahead"),
            Self::Behind => write!(f, "behind"),
            Self::Diverged => write!(f, "diverged"),
            Self::RemoteEmpty => write!(f, "remote_empty"),
        }
    }
}

/// Immutable snapshot of one status inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Whether the path is inside a git repository at all.
    pub tracking: bool,
    pub sync_status: SyncStatus,
    /// Unresolved conflict entries in the index from a prior failed
    /// operation.
    pub conflict: bool,
    /// The last remote commit local history incorporates (the merge base),
    /// when one exists.
    pub last_pulled_commit: Option<String>,
}

impl StatusSnapshot {
    fn untracked() -> Self {
        Self {
            tracking: false,
            sync_status: SyncStatus::Untracked,
            conflict: false,
            last_pulled_commit: None,
        }
    }
}

/// Stateless status computation.
pub struct StatusInspector;

impl StatusInspector {
    /// Inspect the repository containing `path` without touching the
    /// network. A path outside any repository yields the untracked
    /// snapshot, not an error.
    pub fn inspect(path: &Path) -> Result<StatusSnapshot, GitError> {
        match GitClient::open(path) {
            Ok(client) => Self::inspect_client(&client),
            Err(GitError::RepositoryNotFound(_)) => Ok(StatusSnapshot::untracked()),
            Err(e) => Err(e),
        }
    }

    /// Fetch from the remote, then inspect. Network failures propagate as
    /// [`GitError::Network`]; they are never downgraded to `Untracked`.
    pub fn inspect_and_fetch(
        client: &GitClient,
        timeout: Duration,
    ) -> Result<StatusSnapshot, GitError> {
        client.fetch(timeout)?;
        Self::inspect_client(client)
    }

    /// Classify an already-open repository.
    pub fn inspect_client(client: &GitClient) -> Result<StatusSnapshot, GitError> {
        let conflict = client.index_has_conflicts()?;
        let local = client.head_oid()?;
        let upstream = client.upstream_oid()?;

        let (sync_status, last_pulled) = match (local, upstream) {
            (_, None) => (SyncStatus::RemoteEmpty, None),
            (None, Some(_)) => (SyncStatus::Behind, None),
            (Some(l), Some(u)) if l == u => (SyncStatus::UpToDate, Some(u.to_string())),
            (Some(l), Some(u)) => match client.merge_base(l, u)? {
                Some(base) if base == u => (SyncStatus::Ahead, Some(u.to_string())),
                Some(base) if base == l => (SyncStatus::Behind, Some(base.to_string())),
                Some(base) => (SyncStatus::Diverged, Some(base.to_string())),
                // Unrelated histories: treat as diverged and let the merge
                // engine work from an empty base.
                None => (SyncStatus::Diverged, None),
            },
        };

        debug!(status = %sync_status, conflict, "inspected repository status");
        Ok(StatusSnapshot {
            tracking: true,
            sync_status,
            conflict,
            last_pulled_commit: last_pulled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        repo
    }

    fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        let client = GitClient::open(dir).unwrap();
        client.commit(message, false).unwrap();
    }

    #[test]
    fn unversioned_path_is_untracked() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = StatusInspector::inspect(dir.path()).unwrap();
        assert!(!snapshot.tracking);
        assert_eq!(snapshot.sync_status, SyncStatus::Untracked);
        assert!(!snapshot.conflict);
    }

    #[test]
    fn repository_without_upstream_is_remote_empty() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        commit_file(dir.path(), "refs.bib", "entry", "initial");

        let snapshot = StatusInspector::inspect(dir.path()).unwrap();
        assert!(snapshot.tracking);
        assert_eq!(snapshot.sync_status, SyncStatus::RemoteEmpty);
        assert_eq!(snapshot.last_pulled_commit, None);
    }

    #[test]
    fn fresh_repository_is_remote_empty() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let snapshot = StatusInspector::inspect(dir.path()).unwrap();
        assert!(snapshot.tracking);
        assert_eq!(snapshot.sync_status, SyncStatus::RemoteEmpty);
    }

    #[test]
    fn status_display() {
        assert_eq!(SyncStatus::UpToDate.to_string(), "up_to_date");
        assert_eq!(SyncStatus::Diverged.to_string(), "diverged");
        assert_eq!(SyncStatus::RemoteEmpty.to_string(), "remote_empty");
    }
}
