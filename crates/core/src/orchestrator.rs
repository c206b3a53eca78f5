//! Synchronization orchestrator.
//!
//! [`SyncOrchestrator`] composes the status inspector, merge engine,
//! resolver port, and plan applier into the public entry points:
//! `prepare_merge`, `finalize_merge`, `push`, `commit_local_changes`, and
//! the single-call `fetch_and_merge` convenience path.
//!
//! Each synchronization attempt walks the state machine
//! `Idle -> Fetching -> Diffing -> (Clean | AwaitingResolution) ->
//! Applying -> Finalizing -> (Committed | FastForwarded)`, with
//! `Cancelled` reachable from `AwaitingResolution` and `Failed` from any
//! state on I/O or network error. All git-touching steps of one attempt
//! run under the repository's per-path lock, so a concurrent pull and push
//! never interleave ref mutations, and the document write and the merge
//! commit happen inside the same critical section.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::document::DocumentStore;
use crate::errors::{GitError, SyncError};
use crate::git::client::GitClient;
use crate::git::registry::ClientRegistry;
use crate::merge::applier::PlanApplier;
use crate::merge::engine::MergeEngine;
use crate::merge::plan::PullPlan;
use crate::merge::resolver::ConflictResolver;
use crate::model::EntryDatabase;
use crate::status::{StatusInspector, SyncStatus};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// States of one synchronization attempt, used for structured logging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching,
    Diffing,
    AwaitingResolution,
    Applying,
    Finalizing,
    Committed,
    FastForwarded,
    Cancelled,
    Failed,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::Diffing => write!(f, "diffing"),
            Self::AwaitingResolution => write!(f, "awaiting_resolution"),
            Self::Applying => write!(f, "applying"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Committed => write!(f, "committed"),
            Self::FastForwarded => write!(f, "fast_forwarded"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of finalizing a merge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookkeepingResult {
    /// The local ref was simply advanced; no merge commit was created.
    pub is_fast_forward: bool,
}

/// Outcome of a push attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PushResult {
    pub successful: bool,
    /// Local had nothing ahead of the upstream.
    pub noop: bool,
}

impl PushResult {
    fn pushed() -> Self {
        Self {
            successful: true,
            noop: false,
        }
    }

    fn rejected() -> Self {
        Self {
            successful: false,
            noop: false,
        }
    }

    fn noop() -> Self {
        Self {
            successful: true,
            noop: true,
        }
    }
}

/// Aggregate outcome of the single-call `fetch_and_merge` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeReport {
    /// Nothing to merge (status was up-to-date, ahead, or remote-empty).
    UpToDate,
    /// The user cancelled conflict resolution; nothing was applied or
    /// written.
    Cancelled,
    /// The merge completed and was recorded.
    Merged {
        fast_forward: bool,
        resolved_conflicts: usize,
    },
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Composes status inspection, diffing, resolution, and bookkeeping into
/// the public synchronization operations.
///
/// All operations are blocking and I/O-bound; callers own keeping them off
/// any interactive thread.
pub struct SyncOrchestrator {
    registry: Arc<ClientRegistry>,
    store: Arc<dyn DocumentStore>,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<ClientRegistry>,
        store: Arc<dyn DocumentStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Fetch, inspect, and compute the pull plan for `local_db`.
    ///
    /// Returns `None` when there is nothing to merge (`UpToDate`, `Ahead`,
    /// or `RemoteEmpty`). Repeated calls recompute status and diff from
    /// scratch; no state accumulates between calls.
    pub fn prepare_merge(
        &self,
        local_db: &EntryDatabase,
        path: Option<&Path>,
    ) -> Result<Option<PullPlan>, SyncError> {
        let path = path.ok_or(SyncError::NoAssociatedFile)?;
        let client = self.client(path)?;
        let mut guard = client.lock().unwrap();
        guard.set_credentials(self.config.credentials());
        self.prepare_with(&guard, local_db, path)
    }

    /// Record the merge after the caller has applied the plan and written
    /// the document back to disk: stage the file, then fast-forward the
    /// local ref if local had no unique commits, otherwise create a merge
    /// commit.
    pub fn finalize_merge(
        &self,
        path: Option<&Path>,
        plan: &PullPlan,
    ) -> Result<BookkeepingResult, SyncError> {
        let path = path.ok_or(SyncError::NoAssociatedFile)?;
        let client = self.client(path)?;
        let guard = client.lock().unwrap();
        self.finalize_with(&guard, path, plan)
    }

    /// Push local commits to the upstream. Reports `{noop: true}` when
    /// local has nothing ahead; a rejected push reports
    /// `{successful: false}` rather than an error.
    pub fn push(&self, path: Option<&Path>) -> Result<PushResult, SyncError> {
        let path = path.ok_or(SyncError::NoAssociatedFile)?;
        let client = self.client(path)?;
        let mut guard = client.lock().unwrap();
        guard.set_credentials(self.config.credentials());

        let snapshot = StatusInspector::inspect_client(&guard)?;
        match snapshot.sync_status {
            SyncStatus::Ahead => match guard.push(self.config.network_timeout()) {
                Ok(()) => Ok(PushResult::pushed()),
                Err(GitError::PushRejected { branch, detail }) => {
                    warn!(branch, detail, "push rejected by remote");
                    Ok(PushResult::rejected())
                }
                Err(e) => Err(e.into()),
            },
            SyncStatus::RemoteEmpty => {
                guard.push_creating_upstream(self.config.network_timeout())?;
                Ok(PushResult::pushed())
            }
            status => {
                debug!(%status, "nothing to push");
                Ok(PushResult::noop())
            }
        }
    }

    /// Commit all working-tree changes. Returns `false` when the working
    /// tree has no changes relative to HEAD.
    pub fn commit_local_changes(
        &self,
        path: Option<&Path>,
        message: &str,
        amend: bool,
    ) -> Result<bool, SyncError> {
        let path = path.ok_or(SyncError::NoAssociatedFile)?;
        let client = self.client(path)?;
        let guard = client.lock().unwrap();

        if !guard.has_uncommitted_changes()? {
            debug!("working tree clean, nothing to commit");
            return Ok(false);
        }
        match guard.commit(message, amend) {
            Ok(_) => Ok(true),
            // Staging can still produce the HEAD tree (e.g. only ignored
            // files changed).
            Err(GitError::NothingToCommit) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The full synchronization pipeline in one call: fetch, diff, resolve,
    /// apply, write, and record.
    ///
    /// If conflicts exist and the resolver cancels, the operation ends at
    /// `Cancelled` with `db` and the on-disk document untouched.
    pub fn fetch_and_merge(
        &self,
        db: &mut EntryDatabase,
        path: Option<&Path>,
        resolver: &dyn ConflictResolver,
    ) -> Result<MergeReport, SyncError> {
        let path = path.ok_or(SyncError::NoAssociatedFile)?;
        let client = self.client(path)?;
        let mut guard = client.lock().unwrap();
        guard.set_credentials(self.config.credentials());

        let result = self.merge_locked(&guard, db, path, resolver);
        if let Err(e) = &result {
            info!(state = %SyncState::Failed, error = %e, "synchronization failed");
        }
        result
    }

    // -----------------------------------------------------------------------
    // Locked pipeline
    // -----------------------------------------------------------------------

    fn merge_locked(
        &self,
        client: &GitClient,
        db: &mut EntryDatabase,
        path: &Path,
        resolver: &dyn ConflictResolver,
    ) -> Result<MergeReport, SyncError> {
        info!(state = %SyncState::Fetching, path = %path.display(), "starting synchronization");

        let Some(pull) = self.prepare_with(client, db, path)? else {
            debug!("nothing to merge");
            return Ok(MergeReport::UpToDate);
        };

        // Resolve before applying anything: cancellation must leave both
        // the in-memory database and the on-disk document untouched.
        let resolved = if pull.conflicts.is_empty() {
            Vec::new()
        } else {
            info!(
                state = %SyncState::AwaitingResolution,
                conflicts = pull.conflicts.len(),
                "conflicts require resolution"
            );
            match resolver.resolve(&pull.conflicts) {
                Some(resolved) => resolved,
                None => {
                    info!(state = %SyncState::Cancelled, "pull cancelled by resolver");
                    return Ok(MergeReport::Cancelled);
                }
            }
        };

        info!(state = %SyncState::Applying, "applying merge plan");
        PlanApplier::apply_auto_plan(db, &pull.auto_plan);
        PlanApplier::apply_resolved(db, &pull.conflicts, &resolved);

        // Write-then-commit: if the write fails no commit is created and
        // finalize can be retried after the caller writes again.
        self.store.write_path(path, db)?;

        info!(state = %SyncState::Finalizing, "recording merge");
        let bookkeeping = self.finalize_with(client, path, &pull)?;

        let final_state = if bookkeeping.is_fast_forward {
            SyncState::FastForwarded
        } else {
            SyncState::Committed
        };
        info!(state = %final_state, resolved = resolved.len(), "synchronization completed");

        Ok(MergeReport::Merged {
            fast_forward: bookkeeping.is_fast_forward,
            resolved_conflicts: resolved.len(),
        })
    }

    fn prepare_with(
        &self,
        client: &GitClient,
        local_db: &EntryDatabase,
        path: &Path,
    ) -> Result<Option<PullPlan>, SyncError> {
        let snapshot = StatusInspector::inspect_and_fetch(client, self.config.network_timeout())?;
        debug!(status = %snapshot.sync_status, "pre-merge status");

        match snapshot.sync_status {
            SyncStatus::UpToDate | SyncStatus::Ahead | SyncStatus::RemoteEmpty => Ok(None),
            SyncStatus::Untracked => Err(SyncError::NoRepository(path.display().to_string())),
            SyncStatus::Behind | SyncStatus::Diverged => {
                info!(state = %SyncState::Diffing, "computing three-way diff");
                let upstream = client.upstream_oid()?.ok_or_else(|| {
                    GitError::NoUpstream(
                        client.current_branch().unwrap_or_else(|_| "HEAD".to_string()),
                    )
                })?;
                let local_oid = client.head_oid()?;
                let base_oid = match local_oid {
                    Some(local) => client.merge_base(local, upstream)?,
                    None => None,
                };

                let relative = client.relative_path(path)?;
                let remote_db = self.snapshot_at(client, upstream, &relative)?;
                let base_db = match base_oid {
                    Some(base) => self.snapshot_at(client, base, &relative)?,
                    None => EntryDatabase::new(),
                };

                Ok(Some(MergeEngine::diff(&base_db, local_db, &remote_db)))
            }
        }
    }

    fn finalize_with(
        &self,
        client: &GitClient,
        path: &Path,
        plan: &PullPlan,
    ) -> Result<BookkeepingResult, SyncError> {
        let relative = client.relative_path(path)?;
        client.stage_path(&relative)?;

        let branch = client.current_branch().unwrap_or_else(|_| "HEAD".to_string());
        let upstream = client
            .upstream_oid()?
            .ok_or(GitError::NoUpstream(branch))?;
        let local_oid = client.head_oid()?;
        let base_oid = match local_oid {
            Some(local) => client.merge_base(local, upstream)?,
            None => None,
        };

        // Local had no unique commits beyond the common ancestor: advance
        // the ref instead of creating a merge commit.
        let is_fast_forward = match local_oid {
            None => true,
            Some(local) => base_oid == Some(local),
        };

        if is_fast_forward {
            client.fast_forward(upstream)?;
        } else {
            let message = merge_commit_message(plan);
            client.create_merge_commit(&message, upstream)?;
        }

        Ok(BookkeepingResult { is_fast_forward })
    }

    fn snapshot_at(
        &self,
        client: &GitClient,
        commit: git2::Oid,
        relative: &Path,
    ) -> Result<EntryDatabase, SyncError> {
        match client.blob_at(commit, relative)? {
            Some(bytes) => self.store.read_bytes(&bytes),
            None => Ok(EntryDatabase::new()),
        }
    }

    fn client(&self, path: &Path) -> Result<Arc<std::sync::Mutex<GitClient>>, SyncError> {
        self.registry.client_for(path).map_err(|e| match e {
            GitError::RepositoryNotFound(p) => SyncError::NoRepository(p),
            other => SyncError::Git(other),
        })
    }
}

fn merge_commit_message(plan: &PullPlan) -> String {
    format!(
        "Merge remote bibliography changes ({} new, {} updated, {} removed, {} conflicts resolved)",
        plan.auto_plan.new_entries.len(),
        plan.auto_plan.field_patches.len(),
        plan.auto_plan.deleted_keys.len(),
        plan.conflicts.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_state_display() {
        assert_eq!(SyncState::Idle.to_string(), "idle");
        assert_eq!(SyncState::AwaitingResolution.to_string(), "awaiting_resolution");
        assert_eq!(SyncState::FastForwarded.to_string(), "fast_forwarded");
        assert_eq!(SyncState::Failed.to_string(), "failed");
    }

    #[test]
    fn push_result_constructors() {
        assert!(PushResult::noop().noop);
        assert!(PushResult::noop().successful);
        assert!(!PushResult::rejected().successful);
        assert!(PushResult::pushed().successful && !PushResult::pushed().noop);
    }

    #[test]
    fn merge_commit_message_counts_plan_parts() {
        let plan = PullPlan::default();
        assert_eq!(
            merge_commit_message(&plan),
            "Merge remote bibliography changes (0 new, 0 updated, 0 removed, 0 conflicts resolved)"
        );
    }
}
