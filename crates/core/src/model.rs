//! Domain model: bibliographic entries and the in-memory entry database.
//!
//! An [`Entry`] is one structured bibliographic item (a type plus named
//! fields). Its *identity* -- the key used to match it across the base,
//! local, and remote snapshots of a merge -- is the citation key when one
//! is set, otherwise a stable internal id generated at construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved field name under which the entry type participates in
/// field-level diffing, so a type change merges like any other field edit.
pub const ENTRY_TYPE_FIELD: &str = "entrytype";

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A single bibliographic entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Stable internal id, used as identity when no citation key exists.
    id: String,
    /// The entry type (article, book, ...).
    pub entry_type: String,
    /// Citation key, if assigned.
    pub citation_key: Option<String>,
    /// Named fields. Ordered so diffs and serialization are deterministic.
    pub fields: BTreeMap<String, String>,
}

impl Entry {
    /// Create an entry of the given type with a fresh internal id.
    pub fn new(entry_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entry_type: entry_type.into(),
            citation_key: None,
            fields: BTreeMap::new(),
        }
    }

    /// Create an entry with a citation key.
    pub fn with_key(entry_type: impl Into<String>, citation_key: impl Into<String>) -> Self {
        let mut entry = Self::new(entry_type);
        entry.citation_key = Some(citation_key.into());
        entry
    }

    /// Builder-style field assignment.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set a field value.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// The merge identity: citation key if present, internal id otherwise.
    pub fn identity(&self) -> &str {
        self.citation_key.as_deref().unwrap_or(&self.id)
    }

    /// The stable internal id.
    pub fn internal_id(&self) -> &str {
        &self.id
    }

    /// Content equality: two entries are equal iff type and all fields are
    /// equal. Identity and internal id do not participate.
    pub fn content_eq(&self, other: &Entry) -> bool {
        self.entry_type == other.entry_type && self.fields == other.fields
    }

    /// A flat view of the entry for field-level diffing, with the entry
    /// type folded in under [`ENTRY_TYPE_FIELD`].
    pub(crate) fn field_view(&self) -> BTreeMap<&str, &str> {
        let mut view: BTreeMap<&str, &str> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        view.insert(ENTRY_TYPE_FIELD, &self.entry_type);
        view
    }
}

// ---------------------------------------------------------------------------
// EntryDatabase
// ---------------------------------------------------------------------------

/// The in-memory record set: an insertion-ordered collection of entries,
/// addressable by identity.
///
/// The database is owned by the caller (the open document) and is mutated
/// only through these operations, which the merge layer can express and
/// replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryDatabase {
    entries: Vec<Entry>,
}

impl EntryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database from a list of entries, preserving order.
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by identity.
    pub fn get(&self, identity: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.identity() == identity)
    }

    /// Mutable lookup by identity.
    pub fn get_mut(&mut self, identity: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.identity() == identity)
    }

    /// Append an entry.
    pub fn insert(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Identity-keyed upsert: replace an existing entry in place, or append.
    pub fn upsert(&mut self, entry: Entry) {
        match self.position(entry.identity()) {
            Some(pos) => self.entries[pos] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Replace the entry at `identity` with `entry`, keeping its position.
    /// Returns false if no entry with that identity exists.
    pub fn replace(&mut self, identity: &str, entry: Entry) -> bool {
        match self.position(identity) {
            Some(pos) => {
                self.entries[pos] = entry;
                true
            }
            None => false,
        }
    }

    /// Delete-if-present. Returns whether an entry was removed.
    pub fn remove(&mut self, identity: &str) -> bool {
        match self.position(identity) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Iterate identities in insertion order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.identity())
    }

    /// Content equality: same entries (by identity and content) in the same
    /// order.
    pub fn content_eq(&self, other: &EntryDatabase) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| a.identity() == b.identity() && a.content_eq(b))
    }

    fn position(&self, identity: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.identity() == identity)
    }
}
