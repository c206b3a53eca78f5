//! Pluggable conflict resolution.
//!
//! The [`ConflictResolver`] trait is the port through which the orchestrator
//! hands unresolved conflicts to whoever owns resolution decisions. Two
//! kinds of implementation ship with the crate:
//!
//! 1. [`AutoResolver`] -- non-interactive, always prefers one side; used for
//!    automation and tests.
//! 2. [`ChannelResolver`] -- hands the conflict list across an
//!    execution-context boundary (e.g. to a UI event loop) and blocks until
//!    the decision-maker replies or cancels.
//!
//! Returning `None` cancels the whole pull; partial application is
//! structurally impossible because nothing is applied until a complete
//! answer exists.

use std::sync::mpsc;

use tracing::debug;

use crate::merge::plan::EntryConflict;
use crate::model::Entry;

/// One resolved conflict, in the same position as its input conflict.
#[derive(Debug, Clone)]
pub enum ResolvedEntry {
    /// Replace the entry wholesale with this merged record.
    Take(Entry),
    /// Honor the deletion side of a delete/modify conflict.
    Remove,
}

/// The conflict resolution port.
///
/// `resolve` must return resolutions in input order -- the applier maps
/// `resolved[i]` back to `conflicts[i]`'s identity. `None` signals that the
/// user cancelled the pull. The orchestrator never invokes the port with an
/// empty conflict list.
pub trait ConflictResolver {
    fn resolve(&self, conflicts: &[EntryConflict]) -> Option<Vec<ResolvedEntry>>;
}

// ---------------------------------------------------------------------------
// Automatic strategies
// ---------------------------------------------------------------------------

/// Non-interactive resolver that always keeps one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoResolver {
    PreferLocal,
    PreferRemote,
}

impl ConflictResolver for AutoResolver {
    fn resolve(&self, conflicts: &[EntryConflict]) -> Option<Vec<ResolvedEntry>> {
        let resolved = conflicts
            .iter()
            .map(|conflict| {
                let side = match self {
                    AutoResolver::PreferLocal => conflict.local.as_ref(),
                    AutoResolver::PreferRemote => conflict.remote.as_ref(),
                };
                match side {
                    Some(entry) => ResolvedEntry::Take(entry.clone()),
                    // The preferred side deleted the entry.
                    None => ResolvedEntry::Remove,
                }
            })
            .collect();
        Some(resolved)
    }
}

// ---------------------------------------------------------------------------
// Cross-context hand-off
// ---------------------------------------------------------------------------

/// One resolution round-trip delivered to the decision-making context.
///
/// The decision-maker inspects [`ResolutionRequest::conflicts`] and answers
/// with [`ResolutionRequest::submit`] or [`ResolutionRequest::cancel`].
/// Dropping the request unanswered also counts as cancellation.
pub struct ResolutionRequest {
    conflicts: Vec<EntryConflict>,
    reply: mpsc::Sender<Option<Vec<ResolvedEntry>>>,
}

impl ResolutionRequest {
    pub fn conflicts(&self) -> &[EntryConflict] {
        &self.conflicts
    }

    /// Answer the request. Resolutions must match the conflict order.
    pub fn submit(self, resolved: Vec<ResolvedEntry>) {
        let _ = self.reply.send(Some(resolved));
    }

    /// Cancel the pull.
    pub fn cancel(self) {
        let _ = self.reply.send(None);
    }
}

/// Resolver that forwards conflicts to an external decision-maker over a
/// channel and blocks the calling synchronization thread until it answers.
///
/// The synchronization side holds the `ChannelResolver`; the interactive
/// side consumes [`ResolutionRequest`]s from the paired receiver on
/// whatever thread or event loop it owns. The core makes no assumption
/// about the decision-maker's threading model.
pub struct ChannelResolver {
    requests: mpsc::Sender<ResolutionRequest>,
}

impl ChannelResolver {
    /// Create a resolver and the receiver end the decision-maker listens on.
    pub fn new() -> (Self, mpsc::Receiver<ResolutionRequest>) {
        let (tx, rx) = mpsc::channel();
        (Self { requests: tx }, rx)
    }
}

impl ConflictResolver for ChannelResolver {
    fn resolve(&self, conflicts: &[EntryConflict]) -> Option<Vec<ResolvedEntry>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        let request = ResolutionRequest {
            conflicts: conflicts.to_vec(),
            reply: reply_tx,
        };
        if self.requests.send(request).is_err() {
            // Decision-maker is gone; treat as cancellation, not an error.
            debug!("resolution channel closed, treating as cancelled");
            return None;
        }
        reply_rx.recv().ok().flatten()
    }
}
