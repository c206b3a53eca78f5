//! Per-path repository client registry.
//!
//! The registry is a pure cache: one [`GitClient`] per repository root,
//! constructed lazily on first lookup. The `Mutex` around each client is
//! the per-repository lock that serializes fetch/commit/push sequences so
//! a concurrent pull and push never interleave ref mutations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::errors::GitError;
use crate::git::client::GitClient;

/// Lookup cache mapping repository roots to shared clients.
///
/// An explicit instance is passed into the orchestrator; there is no global
/// registry.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<PathBuf, Arc<Mutex<GitClient>>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the client for the repository containing `path`, constructing
    /// it on first use. Distinct files under the same repository root share
    /// one client (and therefore one lock).
    pub fn client_for(&self, path: &Path) -> Result<Arc<Mutex<GitClient>>, GitError> {
        let client = GitClient::open(path)?;
        let root = client.root().to_path_buf();

        let mut clients = self.clients.lock().unwrap();
        let entry = clients.entry(root).or_insert_with(|| {
            debug!(path = %path.display(), "caching new repository client");
            Arc::new(Mutex::new(client))
        });
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;

    #[test]
    fn same_repository_shares_one_client() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.bib"), "a").unwrap();
        std::fs::write(dir.path().join("b.bib"), "b").unwrap();

        let registry = ClientRegistry::new();
        let a = registry.client_for(&dir.path().join("a.bib")).unwrap();
        let b = registry.client_for(&dir.path().join("b.bib")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unversioned_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClientRegistry::new();
        assert!(matches!(
            registry.client_for(dir.path()),
            Err(GitError::RepositoryNotFound(_))
        ));
    }
}
