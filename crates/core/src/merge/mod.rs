//! Three-way merging of entry databases.
//!
//! The merge subsystem is responsible for:
//! 1. **Diffing** -- computing the field-granular three-way diff of the
//!    base, local, and remote snapshots into a [`PullPlan`].
//! 2. **Resolution** -- the pluggable [`ConflictResolver`] port through
//!    which unresolved conflicts reach a decision-maker.
//! 3. **Application** -- replaying the plan and the resolutions onto the
//!    in-memory database.

pub mod applier;
pub mod engine;
pub mod plan;
pub mod resolver;

pub use applier::PlanApplier;
pub use engine::MergeEngine;
pub use plan::{EntryConflict, FieldPatch, MergePlan, PullPlan};
pub use resolver::{
    AutoResolver, ChannelResolver, ConflictResolver, ResolutionRequest, ResolvedEntry,
};
