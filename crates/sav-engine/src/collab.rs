//! Collaborator boundary: where snapshots come from and where patches go.
//!
//! Both traits carry the snapshot type as an associated `Value`.
//! Implementations must be `Send + Sync` so an engine can be shared across
//! tokio tasks behind an `Arc`.

use async_trait::async_trait;
use sav_diff::{Patch, Structural};

/// Source of truth for the Saved snapshot.
///
/// Called once at construction and again on `reset` / `refresh` (and after a
/// successful save when `refresh_after_save` is set). Every call must return
/// a value with the same top-level key set.
///
/// Any `Fn() -> anyhow::Result<V> + Send + Sync` closure is a provider.
pub trait SnapshotProvider: Send + Sync {
    type Value: Structural + Send + 'static;

    fn snapshot(&self) -> anyhow::Result<Self::Value>;
}

impl<F, V> SnapshotProvider for F
where
    F: Fn() -> anyhow::Result<V> + Send + Sync,
    V: Structural + Send + 'static,
{
    type Value = V;

    fn snapshot(&self) -> anyhow::Result<V> {
        self()
    }
}

/// Performs the actual write of a patch (network call, file write, IPC).
///
/// Never called with an empty patch. Must return `Err` to signal failure;
/// the engine does not retry.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    type Value: Structural + Send + 'static;

    async fn persist(&self, patch: Patch<Self::Value>) -> anyhow::Result<()>;
}
