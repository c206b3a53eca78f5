//! Local Git repository operations via `git2`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use git2::{
    Branch, BranchType, Commit, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions,
    RemoteCallbacks, Repository, ResetType, Signature, StatusOptions,
};
use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;

/// Remote name every operation targets. The core manages a single shared
/// remote per repository.
const REMOTE_NAME: &str = "origin";

/// Credentials injected per call; never persisted by the core.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: Option<String>,
    pub token: String,
}

/// High-level Git client wrapping one on-disk repository.
pub struct GitClient {
    repo: Repository,
    root: PathBuf,
    credentials: Option<Credentials>,
}

impl GitClient {
    /// Open the repository containing `path` (the path may be the database
    /// file itself; discovery walks up to the repository root).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::discover(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        let root = repo
            .workdir()
            .unwrap_or_else(|| repo.path())
            .to_path_buf();
        debug!(root = %root.display(), "opened git repository");
        Ok(Self {
            repo,
            root,
            credentials: None,
        })
    }

    /// The repository root (working tree directory).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Inject credentials for subsequent fetch/push calls.
    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.credentials = credentials;
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Name of the currently checked-out branch.
    pub fn current_branch(&self) -> Result<String, GitError> {
        let head = self.repo.head()?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| GitError::RefNotFound("HEAD".to_string()))
    }

    /// Oid of the local branch tip, or `None` on an unborn branch.
    pub fn head_oid(&self) -> Result<Option<Oid>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(head.target()),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Oid of the upstream tracking ref tip, or `None` when the branch has
    /// no upstream (remote empty or never pushed).
    pub fn upstream_oid(&self) -> Result<Option<Oid>, GitError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };
        if !head.is_branch() {
            return Ok(None);
        }
        match Branch::wrap(head).upstream() {
            Ok(upstream) => Ok(upstream.get().target()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Common ancestor of two commits, or `None` for unrelated histories.
    pub fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>, GitError> {
        match self.repo.merge_base(a, b) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Raw blob content of `relative_path` at `commit`, or `None` if the
    /// file does not exist in that tree.
    pub fn blob_at(&self, commit: Oid, relative_path: &Path) -> Result<Option<Vec<u8>>, GitError> {
        let commit = self.repo.find_commit(commit)?;
        let tree = commit.tree()?;
        let entry = match tree.get_path(relative_path) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = entry.to_object(&self.repo)?;
        Ok(object.as_blob().map(|blob| blob.content().to_vec()))
    }

    /// Whether the working tree has any changes relative to HEAD, including
    /// untracked files.
    pub fn has_uncommitted_changes(&self) -> Result<bool, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    /// Whether the index holds unresolved conflict entries from a prior
    /// failed operation.
    pub fn index_has_conflicts(&self) -> Result<bool, GitError> {
        Ok(self.repo.index()?.has_conflicts())
    }

    /// Translate an absolute file path into a path relative to the working
    /// tree root, as used in tree lookups.
    pub fn relative_path(&self, path: &Path) -> Result<PathBuf, GitError> {
        let workdir = self
            .repo
            .workdir()
            .ok_or_else(|| GitError::RepositoryNotFound(self.root.display().to_string()))?;
        let file = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let dir = workdir
            .canonicalize()
            .unwrap_or_else(|_| workdir.to_path_buf());
        file.strip_prefix(&dir)
            .map(Path::to_path_buf)
            .map_err(|_| GitError::OutsideWorkTree(path.display().to_string()))
    }

    // -----------------------------------------------------------------------
    // Network operations
    // -----------------------------------------------------------------------

    /// Fetch from the shared remote, aborting after `timeout`.
    #[instrument(skip(self))]
    pub fn fetch(&self, timeout: Duration) -> Result<(), GitError> {
        let mut remote = self.repo.find_remote(REMOTE_NAME)?;
        let timed_out = Arc::new(AtomicBool::new(false));
        let callbacks = self.remote_callbacks(timeout, &timed_out);
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(callbacks);
        remote
            .fetch(&[] as &[&str], Some(&mut opts), None)
            .map_err(|e| classify_remote_error(e, &timed_out))?;
        debug!("fetch completed");
        Ok(())
    }

    /// Push the current branch to the shared remote.
    #[instrument(skip(self))]
    pub fn push(&self, timeout: Duration) -> Result<(), GitError> {
        let branch = self.current_branch()?;
        info!(branch, "pushing");
        let mut remote = self.repo.find_remote(REMOTE_NAME)?;

        let timed_out = Arc::new(AtomicBool::new(false));
        let mut callbacks = self.remote_callbacks(timeout, &timed_out);

        let rejection = Arc::new(Mutex::new(None::<String>));
        let rejection_sink = rejection.clone();
        callbacks.push_update_reference(move |refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                *rejection_sink.lock().unwrap() = Some(msg.to_string());
            }
            Ok(())
        });

        let mut opts = PushOptions::new();
        opts.remote_callbacks(callbacks);
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        remote
            .push(&[&refspec], Some(&mut opts))
            .map_err(|e| classify_remote_error(e, &timed_out))?;

        if let Some(detail) = rejection.lock().unwrap().take() {
            return Err(GitError::PushRejected { branch, detail });
        }
        info!("push completed");
        Ok(())
    }

    /// Push the current branch and record it as the upstream tracking ref,
    /// for remotes that had no commits yet.
    #[instrument(skip(self))]
    pub fn push_creating_upstream(&self, timeout: Duration) -> Result<(), GitError> {
        self.push(timeout)?;
        // Make sure the remote-tracking ref exists before wiring it up.
        self.fetch(timeout)?;
        let branch_name = self.current_branch()?;
        let mut branch = self.repo.find_branch(&branch_name, BranchType::Local)?;
        branch.set_upstream(Some(&format!("{REMOTE_NAME}/{branch_name}")))?;
        info!(branch = branch_name, "upstream tracking ref created");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Local mutations
    // -----------------------------------------------------------------------

    /// Stage one file.
    pub fn stage_path(&self, relative_path: &Path) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.add_path(relative_path)?;
        index.write()?;
        Ok(())
    }

    /// Stage all changes and create a commit on HEAD, or amend the current
    /// tip when `amend` is set.
    #[instrument(skip(self, message))]
    pub fn commit(&self, message: &str, amend: bool) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        if amend {
            let head = self.repo.head()?.peel_to_commit()?;
            let oid = head.amend(Some("HEAD"), None, None, None, Some(message), Some(&tree))?;
            info!(sha = %oid, "amended commit");
            return Ok(oid);
        }

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                None
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(parent) = &parent {
            if parent.tree_id() == tree_oid {
                return Err(GitError::NothingToCommit);
            }
        }

        let sig = self.signature()?;
        let parents: Vec<&Commit> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        info!(sha = %oid, "created commit");
        Ok(oid)
    }

    /// Create a two-parent merge commit of HEAD and `theirs` from the
    /// current working tree state.
    #[instrument(skip(self, message))]
    pub fn create_merge_commit(&self, message: &str, theirs: Oid) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let local = self.repo.head()?.peel_to_commit()?;
        let remote = self.repo.find_commit(theirs)?;
        let sig = self.signature()?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&local, &remote])?;
        info!(sha = %oid, "created merge commit");
        Ok(oid)
    }

    /// Advance the local ref (and index) to `target` without touching the
    /// working tree, for merges where local had no unique commits.
    pub fn fast_forward(&self, target: Oid) -> Result<(), GitError> {
        let object = self.repo.find_object(target, None)?;
        self.repo.reset(&object, ResetType::Mixed, None)?;
        info!(target = %target, "fast-forwarded local ref");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn signature(&self) -> Result<Signature<'static>, GitError> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig),
            // No user.name/email configured; fall back to a sync identity.
            Err(_) => Ok(Signature::now("bibsync", "bibsync@localhost")?),
        }
    }

    /// Build remote callbacks carrying credentials and a deadline that
    /// aborts the transfer once `timeout` elapses.
    fn remote_callbacks(
        &self,
        timeout: Duration,
        timed_out: &Arc<AtomicBool>,
    ) -> RemoteCallbacks<'static> {
        let mut callbacks = RemoteCallbacks::new();

        if let Some(creds) = &self.credentials {
            let username = creds
                .username
                .clone()
                .unwrap_or_else(|| "x-access-token".to_string());
            let token = creds.token.clone();
            callbacks.credentials(move |_url, _username, _allowed| {
                git2::Cred::userpass_plaintext(&username, &token)
            });
        }

        let deadline = Instant::now() + timeout;
        let flag = timed_out.clone();
        callbacks.transfer_progress(move |_progress| {
            if Instant::now() > deadline {
                flag.store(true, Ordering::Relaxed);
                false
            } else {
                true
            }
        });
        let flag = timed_out.clone();
        callbacks.sideband_progress(move |_data| {
            if Instant::now() > deadline {
                flag.store(true, Ordering::Relaxed);
                false
            } else {
                true
            }
        });

        callbacks
    }
}

/// Map a transfer failure to [`GitError::Network`] when our deadline fired,
/// otherwise classify by error class.
fn classify_remote_error(err: git2::Error, timed_out: &AtomicBool) -> GitError {
    if timed_out.load(Ordering::Relaxed) {
        GitError::Network(format!("operation timed out: {}", err.message()))
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        repo
    }

    #[test]
    fn open_discovers_from_a_file_path() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("refs.bib"), "x").unwrap();

        let client = GitClient::open(dir.path().join("refs.bib")).unwrap();
        assert_eq!(
            client.root().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn open_fails_outside_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitClient::open(dir.path()),
            Err(GitError::RepositoryNotFound(_))
        ));
    }

    #[test]
    fn commit_and_head_oid() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let client = GitClient::open(dir.path()).unwrap();

        assert_eq!(client.head_oid().unwrap(), None);

        std::fs::write(dir.path().join("refs.bib"), "entry").unwrap();
        let oid = client.commit("initial commit", false).unwrap();
        assert_eq!(client.head_oid().unwrap(), Some(oid));
    }

    #[test]
    fn commit_with_clean_tree_is_nothing_to_commit() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let client = GitClient::open(dir.path()).unwrap();

        std::fs::write(dir.path().join("refs.bib"), "entry").unwrap();
        client.commit("initial commit", false).unwrap();

        assert!(matches!(
            client.commit("empty", false),
            Err(GitError::NothingToCommit)
        ));
    }

    #[test]
    fn amend_rewrites_the_tip() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let client = GitClient::open(dir.path()).unwrap();

        std::fs::write(dir.path().join("refs.bib"), "v1").unwrap();
        let first = client.commit("first", false).unwrap();

        std::fs::write(dir.path().join("refs.bib"), "v2").unwrap();
        let amended = client.commit("first, fixed", true).unwrap();

        assert_ne!(first, amended);
        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id(), amended);
        assert_eq!(head.parent_count(), 0);
        assert_eq!(head.message().unwrap(), "first, fixed");
    }

    #[test]
    fn blob_at_reads_committed_content() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let client = GitClient::open(dir.path()).unwrap();

        std::fs::write(dir.path().join("refs.bib"), "committed content").unwrap();
        let oid = client.commit("initial", false).unwrap();

        let blob = client.blob_at(oid, Path::new("refs.bib")).unwrap().unwrap();
        assert_eq!(blob, b"committed content");

        assert!(client.blob_at(oid, Path::new("missing.bib")).unwrap().is_none());
    }

    #[test]
    fn has_uncommitted_changes_tracks_the_worktree() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let client = GitClient::open(dir.path()).unwrap();

        std::fs::write(dir.path().join("refs.bib"), "v1").unwrap();
        client.commit("initial", false).unwrap();
        assert!(!client.has_uncommitted_changes().unwrap());

        std::fs::write(dir.path().join("refs.bib"), "v2").unwrap();
        assert!(client.has_uncommitted_changes().unwrap());
    }

    #[test]
    fn relative_path_strips_the_workdir() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("refs.bib"), "x").unwrap();
        let client = GitClient::open(dir.path()).unwrap();

        let rel = client.relative_path(&dir.path().join("refs.bib")).unwrap();
        assert_eq!(rel, PathBuf::from("refs.bib"));

        assert!(matches!(
            client.relative_path(Path::new("/definitely/elsewhere.bib")),
            Err(GitError::OutsideWorkTree(_))
        ));
    }
}
