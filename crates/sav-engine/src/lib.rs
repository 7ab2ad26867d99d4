//! sav-engine
//!
//! Reconciliation engine for an editing session over one persisted entity.
//!
//! - Owns a Saved snapshot (last confirmed persisted) and a Current working copy
//! - Changes are the structural diff Saved -> Current
//! - `save` sends only the changed fields to the sink, at most one in flight
//! - `reset` discards edits; `refresh` re-reads the baseline
//! - Provider and sink failures pass through to the caller untouched
//!
//! No IO of its own: the provider and sink are supplied by the caller.

mod collab;
mod engine;
mod gate;
mod types;

pub use collab::{PersistenceSink, SnapshotProvider};
pub use engine::Savable;
pub use gate::{check_discard_gate, DiscardGate};
pub use types::*;

pub use sav_diff::{Change, Diff, Patch, Shape, Structural};
