//! bibsync-core: field-granular git synchronization for shared
//! bibliographic databases.
//!
//! The crate keeps a local bibliography file in step with a copy shared
//! through a git remote. Instead of delegating to git's textual merge, it
//! parses both sides into entry databases and merges at entry/field
//! granularity: non-overlapping edits apply automatically, true conflicts
//! are handed to a [`merge::ConflictResolver`] where the caller (typically
//! a UI) decides or cancels.
//!
//! Typical flow:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use bibsync_core::{ClientRegistry, SyncConfig, SyncOrchestrator};
//! # use bibsync_core::merge::AutoResolver;
//! # fn store() -> Arc<dyn bibsync_core::DocumentStore> { unimplemented!() }
//! # fn main() -> Result<(), bibsync_core::SyncError> {
//! let orchestrator = SyncOrchestrator::new(
//!     Arc::new(ClientRegistry::new()),
//!     store(),
//!     SyncConfig::default(),
//! );
//! # let mut db = bibsync_core::EntryDatabase::new();
//! # let path = std::path::Path::new("refs.bib");
//! let report = orchestrator.fetch_and_merge(&mut db, Some(path), &AutoResolver::PreferLocal)?;
//! orchestrator.push(Some(path))?;
//! # Ok(())
//! # }
//! ```
//!
//! All operations are blocking; callers own thread placement. Concurrent
//! operations on the same repository serialize on a per-path lock.

pub mod config;
pub mod document;
pub mod errors;
pub mod git;
pub mod merge;
pub mod model;
pub mod orchestrator;
pub mod status;

pub use config::SyncConfig;
pub use document::DocumentStore;
pub use errors::{ConfigError, GitError, SyncError};
pub use git::{ClientRegistry, Credentials, GitClient};
pub use model::{Entry, EntryDatabase, ENTRY_TYPE_FIELD};
pub use orchestrator::{BookkeepingResult, MergeReport, PushResult, SyncOrchestrator, SyncState};
pub use status::{StatusInspector, StatusSnapshot, SyncStatus};
