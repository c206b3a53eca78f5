//! Field-granular three-way diff of entry databases.
//!
//! Given base, local, and remote snapshots of the record set, the engine
//! produces a [`PullPlan`]: the auto-resolvable changes plus the conflicts
//! that need a resolver. Changes to *different fields* of the same entry
//! never conflict -- that is what distinguishes this engine from a
//! line-based merge. The diff is deterministic and never mutates its
//! inputs.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::merge::plan::{EntryConflict, FieldPatch, PullPlan};
use crate::model::{Entry, EntryDatabase};

/// Stateless three-way merge engine.
pub struct MergeEngine;

impl MergeEngine {
    /// Compute the pull plan reconciling `local` and `remote` against their
    /// common ancestor `base`.
    pub fn diff(base: &EntryDatabase, local: &EntryDatabase, remote: &EntryDatabase) -> PullPlan {
        let identities: BTreeSet<&str> = base
            .identities()
            .chain(local.identities())
            .chain(remote.identities())
            .collect();

        let mut plan = PullPlan::default();

        for id in identities {
            match (base.get(id), local.get(id), remote.get(id)) {
                // Local-only addition: already in local, nothing to reconcile.
                (None, Some(_), None) => {}

                // Remote-only addition.
                (None, None, Some(r)) => {
                    plan.auto_plan.new_entries.push(r.clone());
                }

                // Added on both sides. Identical additions converge; anything
                // else is a conflict with no base version.
                (None, Some(l), Some(r)) => {
                    if !l.content_eq(r) {
                        plan.conflicts.push(EntryConflict {
                            base: None,
                            local: Some(l.clone()),
                            remote: Some(r.clone()),
                        });
                    }
                }

                // Local deleted it. Honor the deletion if the remote left the
                // entry untouched: the plan records the key so the deletion
                // is part of the reconciled description (application is
                // delete-if-present, so replaying it on local is a no-op). A
                // remote modification makes this a deletion-vs-modification
                // conflict with an explicit absent-local marker.
                (Some(b), None, Some(r)) => {
                    if r.content_eq(b) {
                        plan.auto_plan.deleted_keys.insert(id.to_string());
                    } else {
                        plan.conflicts.push(EntryConflict {
                            base: Some(b.clone()),
                            local: None,
                            remote: Some(r.clone()),
                        });
                    }
                }

                // Remote deleted it: the symmetric case.
                (Some(b), Some(l), None) => {
                    if l.content_eq(b) {
                        plan.auto_plan.deleted_keys.insert(id.to_string());
                    } else {
                        plan.conflicts.push(EntryConflict {
                            base: Some(b.clone()),
                            local: Some(l.clone()),
                            remote: None,
                        });
                    }
                }

                // Deleted on both sides: nothing left to do.
                (Some(_), None, None) => {}

                // Present everywhere: field-level three-way diff.
                (Some(b), Some(l), Some(r)) => {
                    match diff_fields(b, l, r) {
                        FieldOutcome::Clean => {}
                        FieldOutcome::Patch(patch) => {
                            plan.auto_plan.field_patches.insert(id.to_string(), patch);
                        }
                        FieldOutcome::Conflict => {
                            debug!(identity = id, "overlapping field edits, emitting conflict");
                            plan.conflicts.push(EntryConflict {
                                base: Some(b.clone()),
                                local: Some(l.clone()),
                                remote: Some(r.clone()),
                            });
                        }
                    }
                }

                (None, None, None) => unreachable!("identity came from the union"),
            }
        }

        info!(
            new_entries = plan.auto_plan.new_entries.len(),
            patched = plan.auto_plan.field_patches.len(),
            deleted = plan.auto_plan.deleted_keys.len(),
            conflicts = plan.conflicts.len(),
            "computed three-way diff"
        );
        plan
    }
}

enum FieldOutcome {
    /// Neither side changed the entry (or only convergent edits).
    Clean,
    /// Auto-mergeable field edits.
    Patch(FieldPatch),
    /// The same field was changed to different values on both sides.
    Conflict,
}

/// Compare both sides' field edits against base.
///
/// A field counts as changed when its value differs from base, including
/// added and removed fields. If local and remote changed the same field to
/// the *same* value that is a convergent edit, not a conflict.
fn diff_fields(base: &Entry, local: &Entry, remote: &Entry) -> FieldOutcome {
    let local_changes = changed_fields(base, local);
    let remote_changes = changed_fields(base, remote);

    for (field, remote_value) in &remote_changes {
        if let Some(local_value) = local_changes.get(field) {
            if local_value != remote_value {
                return FieldOutcome::Conflict;
            }
        }
    }

    // Disjoint (or convergent) edits: union both sides into one patch.
    // Local-side values are included too; re-applying them is harmless and
    // keeps the patch a complete description of the reconciled entry.
    let mut patch: FieldPatch = local_changes;
    patch.extend(remote_changes);

    if patch.is_empty() {
        FieldOutcome::Clean
    } else {
        FieldOutcome::Patch(patch)
    }
}

/// The set of fields whose value in `side` differs from `base`, mapped to
/// the side's value (`None` = the side removed the field).
fn changed_fields(base: &Entry, side: &Entry) -> FieldPatch {
    let base_view = base.field_view();
    let side_view = side.field_view();

    let mut changes: FieldPatch = BTreeMap::new();
    for (field, value) in &side_view {
        if base_view.get(field) != Some(value) {
            changes.insert((*field).to_string(), Some((*value).to_string()));
        }
    }
    for field in base_view.keys() {
        if !side_view.contains_key(field) {
            changes.insert((*field).to_string(), None);
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(entries: Vec<Entry>) -> EntryDatabase {
        EntryDatabase::from_entries(entries)
    }

    fn base_entry() -> Entry {
        Entry::with_key("article", "k1").field("title", "A")
    }

    #[test]
    fn identical_inputs_yield_empty_plan() {
        let a = db(vec![base_entry(), Entry::with_key("book", "k2").field("title", "B")]);
        let plan = MergeEngine::diff(&a, &a, &a);
        assert!(plan.is_empty());
    }

    #[test]
    fn disjoint_field_edits_auto_merge() {
        let base = db(vec![base_entry()]);
        let local = db(vec![base_entry().field("year", "2020")]);
        let remote = db(vec![base_entry().field("note", "x")]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert!(plan.is_clean());
        let patch = &plan.auto_plan.field_patches["k1"];
        assert_eq!(patch["year"], Some("2020".to_string()));
        assert_eq!(patch["note"], Some("x".to_string()));
    }

    #[test]
    fn same_field_different_values_conflicts() {
        let base = db(vec![base_entry()]);
        let local = db(vec![Entry::with_key("article", "k1").field("title", "B")]);
        let remote = db(vec![Entry::with_key("article", "k1").field("title", "C")]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert!(plan.auto_plan.is_empty());
        assert_eq!(plan.conflicts.len(), 1);

        let conflict = &plan.conflicts[0];
        assert_eq!(conflict.base.as_ref().unwrap().fields["title"], "A");
        assert_eq!(conflict.local.as_ref().unwrap().fields["title"], "B");
        assert_eq!(conflict.remote.as_ref().unwrap().fields["title"], "C");
    }

    #[test]
    fn convergent_edit_is_not_a_conflict() {
        let base = db(vec![base_entry()]);
        let both = db(vec![Entry::with_key("article", "k1").field("title", "B")]);

        let plan = MergeEngine::diff(&base, &both, &both);
        assert!(plan.is_clean());
        let patch = &plan.auto_plan.field_patches["k1"];
        assert_eq!(patch["title"], Some("B".to_string()));
    }

    #[test]
    fn remote_addition_lands_in_new_entries() {
        let base = db(vec![base_entry()]);
        let local = db(vec![base_entry()]);
        let remote = db(vec![base_entry(), Entry::with_key("book", "k2").field("title", "B")]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert!(plan.is_clean());
        assert_eq!(plan.auto_plan.new_entries.len(), 1);
        assert_eq!(plan.auto_plan.new_entries[0].identity(), "k2");
    }

    #[test]
    fn local_addition_is_not_planned() {
        let base = db(vec![]);
        let local = db(vec![base_entry()]);
        let remote = db(vec![]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert!(plan.is_empty());
    }

    #[test]
    fn honored_local_deletion() {
        let base = db(vec![base_entry(), Entry::with_key("misc", "k3").field("title", "T")]);
        let local = db(vec![base_entry()]);
        let remote = db(vec![base_entry(), Entry::with_key("misc", "k3").field("title", "T")]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert!(plan.is_clean());
        assert!(plan.auto_plan.deleted_keys.contains("k3"));
    }

    #[test]
    fn deletion_vs_modification_is_a_conflict() {
        let base = db(vec![base_entry()]);
        let local = db(vec![]);
        let remote = db(vec![base_entry().field("note", "x")]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert_eq!(plan.conflicts.len(), 1);
        assert!(plan.conflicts[0].local.is_none());
        assert!(plan.conflicts[0].remote.is_some());
        assert!(plan.auto_plan.is_empty());
    }

    #[test]
    fn modification_vs_remote_deletion_is_a_conflict() {
        let base = db(vec![base_entry()]);
        let local = db(vec![base_entry().field("note", "x")]);
        let remote = db(vec![]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert_eq!(plan.conflicts.len(), 1);
        assert!(plan.conflicts[0].remote.is_none());
        assert!(plan.auto_plan.deleted_keys.is_empty());
    }

    #[test]
    fn both_sides_deleted_is_a_no_op() {
        let base = db(vec![base_entry()]);
        let empty = db(vec![]);

        let plan = MergeEngine::diff(&base, &empty, &empty);
        assert!(plan.is_empty());
    }

    #[test]
    fn divergent_double_addition_conflicts() {
        let base = db(vec![]);
        let local = db(vec![Entry::with_key("article", "k1").field("title", "L")]);
        let remote = db(vec![Entry::with_key("article", "k1").field("title", "R")]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert_eq!(plan.conflicts.len(), 1);
        assert!(plan.conflicts[0].base.is_none());
    }

    #[test]
    fn identical_double_addition_converges() {
        let base = db(vec![]);
        let local = db(vec![Entry::with_key("article", "k1").field("title", "X")]);
        let remote = db(vec![Entry::with_key("article", "k1").field("title", "X")]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert!(plan.is_empty());
    }

    #[test]
    fn remote_field_removal_patches_as_none() {
        let base = db(vec![base_entry().field("note", "drop me")]);
        let local = db(vec![base_entry().field("note", "drop me")]);
        let remote = db(vec![base_entry()]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert!(plan.is_clean());
        assert_eq!(plan.auto_plan.field_patches["k1"]["note"], None);
    }

    #[test]
    fn entry_type_change_merges_like_a_field() {
        let base = db(vec![base_entry()]);
        let local = db(vec![base_entry()]);
        let remote = db(vec![Entry::with_key("inproceedings", "k1").field("title", "A")]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert!(plan.is_clean());
        assert_eq!(
            plan.auto_plan.field_patches["k1"][crate::model::ENTRY_TYPE_FIELD],
            Some("inproceedings".to_string())
        );
    }

    #[test]
    fn conflicted_identity_never_appears_in_the_auto_plan() {
        let base = db(vec![base_entry().field("year", "2019")]);
        // Same field ("title") diverges while another field ("year") also
        // changed on one side: the whole entry must conflict, with no
        // partial patch.
        let local = db(vec![Entry::with_key("article", "k1")
            .field("title", "B")
            .field("year", "2020")]);
        let remote = db(vec![Entry::with_key("article", "k1")
            .field("title", "C")
            .field("year", "2019")]);

        let plan = MergeEngine::diff(&base, &local, &remote);
        assert_eq!(plan.conflicts.len(), 1);
        assert!(!plan.auto_plan.field_patches.contains_key("k1"));
        assert!(!plan.auto_plan.deleted_keys.contains("k1"));
    }
}
