//! Document read/write port.
//!
//! Parsing and serialization of the bibliographic file format are outside
//! this crate. The synchronization core consumes them through the
//! [`DocumentStore`] capability: implementations must write with the same
//! configuration as manual saves (atomic write, backup, encoding, line
//! separators) so a synced save is indistinguishable from a user save.

use std::path::Path;

use crate::errors::SyncError;
use crate::model::EntryDatabase;

/// Opaque read/write capability for the on-disk document format.
pub trait DocumentStore: Send + Sync {
    /// Read and parse the document at `path`.
    fn read_path(&self, path: &Path) -> Result<EntryDatabase, SyncError>;

    /// Parse document content fetched from a git blob (the base or remote
    /// snapshot of a merge).
    fn read_bytes(&self, bytes: &[u8]) -> Result<EntryDatabase, SyncError>;

    /// Serialize `db` to `path` using the manual-save writer configuration.
    fn write_path(&self, path: &Path, db: &EntryDatabase) -> Result<(), SyncError>;
}
