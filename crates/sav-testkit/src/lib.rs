//! sav-testkit
//!
//! Collaborator doubles for editing-session tests. Used ONLY by tests.
//!
//! - [`MemoryStore`]: one JSON document acting as both provider and sink;
//!   persisted patches are applied to it, so a refresh sees the write
//! - [`RecordingSink`]: records every patch, optionally refuses them
//! - [`GatedSink`]: holds each persist call open until the test releases it
//!
//! All doubles are cheap `Clone` handles over shared state, so the same
//! store can be handed to a session as provider and sink and still be
//! inspected by the test.

mod sinks;
mod store;

pub use sinks::{GatedSink, RecordingSink, SinkGate};
pub use store::MemoryStore;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
