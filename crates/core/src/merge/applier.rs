//! Applies merge plans and conflict resolutions to the in-memory database.

use tracing::{debug, warn};

use crate::merge::plan::{EntryConflict, MergePlan};
use crate::merge::resolver::ResolvedEntry;
use crate::model::{EntryDatabase, ENTRY_TYPE_FIELD};

/// Stateless plan application.
pub struct PlanApplier;

impl PlanApplier {
    /// Apply the auto-resolvable part of a pull: identity-keyed upsert of
    /// new entries, patching of only the named fields, delete-if-present.
    ///
    /// Applying an empty plan is a no-op and re-applying the same plan is
    /// idempotent.
    pub fn apply_auto_plan(db: &mut EntryDatabase, plan: &MergePlan) {
        for entry in &plan.new_entries {
            db.upsert(entry.clone());
        }

        for (identity, patch) in &plan.field_patches {
            let Some(entry) = db.get_mut(identity) else {
                // The target vanished between diff and apply; the deletion
                // wins and the patch has nothing to do.
                debug!(identity, "skipping patch for missing entry");
                continue;
            };
            for (field, value) in patch {
                if field.as_str() == ENTRY_TYPE_FIELD {
                    if let Some(new_type) = value {
                        entry.entry_type = new_type.clone();
                    }
                } else {
                    match value {
                        Some(v) => {
                            entry.fields.insert(field.clone(), v.clone());
                        }
                        None => {
                            entry.fields.remove(field);
                        }
                    }
                }
            }
        }

        for identity in &plan.deleted_keys {
            db.remove(identity);
        }
    }

    /// Apply conflict resolutions: whole-record replacement (resolution
    /// already produced a complete merged record) or removal, with
    /// `resolved[i]` mapped to `conflicts[i]`'s identity.
    ///
    /// The resolver contract requires one resolution per conflict; a
    /// mismatched count panics in debug builds and is logged in release
    /// builds, where only the paired prefix is applied.
    pub fn apply_resolved(
        db: &mut EntryDatabase,
        conflicts: &[EntryConflict],
        resolved: &[ResolvedEntry],
    ) {
        debug_assert_eq!(
            conflicts.len(),
            resolved.len(),
            "resolution count must match conflict count"
        );
        if conflicts.len() != resolved.len() {
            warn!(
                conflicts = conflicts.len(),
                resolved = resolved.len(),
                "resolution count does not match conflict count"
            );
        }

        for (conflict, resolution) in conflicts.iter().zip(resolved) {
            let identity = conflict.identity();
            match resolution {
                ResolvedEntry::Take(entry) => {
                    if !db.replace(identity, entry.clone()) {
                        db.upsert(entry.clone());
                    }
                }
                ResolvedEntry::Remove => {
                    db.remove(identity);
                }
            }
        }
    }
}
