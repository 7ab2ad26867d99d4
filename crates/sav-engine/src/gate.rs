//! Discard gate.
//!
//! Checked by a caller before it tears down an editing session (closing a
//! form, navigating away). Teardown never cancels anything, so the gate
//! only reports what would be lost or left running:
//!
//! 1. an in-flight save (it will complete, or fail, unobserved)
//! 2. unsaved edits (they will be discarded)
//!
//! Pure function of the engine's observable state.

use sav_diff::Diff;

/// Result of a discard check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscardGate {
    /// Nothing pending; the session can be dropped.
    Clear,
    /// A save is in flight. Takes precedence over pending edits.
    SaveInFlight,
    /// Unsaved edits would be lost. `pointers` lists the changed leaves.
    PendingChanges { pointers: Vec<String> },
}

impl DiscardGate {
    pub fn is_clear(&self) -> bool {
        matches!(self, DiscardGate::Clear)
    }

    pub fn is_blocked(&self) -> bool {
        !self.is_clear()
    }
}

pub fn check_discard_gate<V>(saving: bool, changes: &Diff<V>) -> DiscardGate {
    if saving {
        return DiscardGate::SaveInFlight;
    }
    match changes {
        Diff::Unchanged => DiscardGate::Clear,
        Diff::Changed(patch) => DiscardGate::PendingChanges {
            pointers: patch.leaf_pointers(),
        },
    }
}
