//! Merge plan value types.
//!
//! A [`PullPlan`] is the full output of one three-way diff: the
//! auto-resolvable [`MergePlan`] plus the list of [`EntryConflict`]s the
//! engine could not reconcile. All of these are short-lived, single-use
//! values created and consumed within one synchronization operation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::Entry;

/// Field edits for one entry: `Some(value)` sets the field, `None` removes
/// it. Fields not named are left untouched.
pub type FieldPatch = BTreeMap<String, Option<String>>;

// ---------------------------------------------------------------------------
// MergePlan
// ---------------------------------------------------------------------------

/// The auto-resolvable subset of a three-way diff.
///
/// Invariants: no identity appears both here and in the conflict list of
/// the owning [`PullPlan`]; `deleted_keys` never overlaps `new_entries`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergePlan {
    /// Entries present only on the remote side; inserted verbatim.
    pub new_entries: Vec<Entry>,
    /// Per-identity field patches for entries changed on one side only (or
    /// on both sides in disjoint fields).
    pub field_patches: BTreeMap<String, FieldPatch>,
    /// Identities deleted locally whose remote counterpart is unchanged.
    pub deleted_keys: BTreeSet<String>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.new_entries.is_empty() && self.field_patches.is_empty() && self.deleted_keys.is_empty()
    }
}

// ---------------------------------------------------------------------------
// EntryConflict
// ---------------------------------------------------------------------------

/// An entry whose base/local/remote versions cannot be reconciled
/// automatically.
///
/// `local: None` marks the deletion-vs-modification case (local deleted an
/// entry the remote changed); `remote: None` is the symmetric case.
/// `base: None` with both sides present marks divergent additions of the
/// same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConflict {
    pub base: Option<Entry>,
    pub local: Option<Entry>,
    pub remote: Option<Entry>,
}

impl EntryConflict {
    /// The identity the three versions were matched on.
    pub fn identity(&self) -> &str {
        self.local
            .as_ref()
            .or(self.remote.as_ref())
            .or(self.base.as_ref())
            .map(Entry::identity)
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// PullPlan
// ---------------------------------------------------------------------------

/// The complete result of one merge computation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullPlan {
    /// Changes that apply without user involvement.
    pub auto_plan: MergePlan,
    /// Unresolved conflicts, in deterministic identity order.
    pub conflicts: Vec<EntryConflict>,
}

impl PullPlan {
    /// True when every change auto-merges.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// True when local and remote need no reconciliation at all.
    pub fn is_empty(&self) -> bool {
        self.auto_plan.is_empty() && self.conflicts.is_empty()
    }
}
