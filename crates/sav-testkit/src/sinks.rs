use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sav_diff::Patch;
use sav_engine::PersistenceSink;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use crate::lock;

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Records every patch it is handed.
#[derive(Clone, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<Patch<Value>>>>,
    refuse_with: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records and then rejects every patch with `msg`.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            calls: Arc::default(),
            refuse_with: Some(msg.into()),
        }
    }

    pub fn calls(&self) -> Vec<Patch<Value>> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    type Value = Value;

    async fn persist(&self, patch: Patch<Value>) -> Result<()> {
        lock(&self.calls).push(patch);
        match &self.refuse_with {
            Some(msg) => bail!("{msg}"),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// GatedSink
// ---------------------------------------------------------------------------

/// A sink whose persist calls park until the paired [`SinkGate`] releases them.
///
/// Lets a test observe a session while a save is in flight.
#[derive(Clone)]
pub struct GatedSink {
    shared: Arc<GateShared>,
}

/// Test-side handle of a [`GatedSink`].
#[derive(Clone)]
pub struct SinkGate {
    shared: Arc<GateShared>,
}

struct GateShared {
    calls: Mutex<Vec<Patch<Value>>>,
    entered: Notify,
    release: Semaphore,
    outcomes: Mutex<VecDeque<Option<String>>>,
}

impl GatedSink {
    pub fn new() -> (GatedSink, SinkGate) {
        let shared = Arc::new(GateShared {
            calls: Mutex::new(Vec::new()),
            entered: Notify::new(),
            release: Semaphore::new(0),
            outcomes: Mutex::new(VecDeque::new()),
        });
        (
            GatedSink {
                shared: Arc::clone(&shared),
            },
            SinkGate { shared },
        )
    }
}

impl SinkGate {
    /// Wait until a persist call has started. Returns immediately if one
    /// started before this was called and has not been waited for yet.
    pub async fn entered(&self) {
        self.shared.entered.notified().await;
    }

    /// Let one parked persist call succeed.
    pub fn release_ok(&self) {
        self.release(None);
    }

    /// Let one parked persist call fail with `msg`.
    pub fn release_err(&self, msg: impl Into<String>) {
        self.release(Some(msg.into()));
    }

    fn release(&self, outcome: Option<String>) {
        lock(&self.shared.outcomes).push_back(outcome);
        self.shared.release.add_permits(1);
    }

    pub fn calls(&self) -> Vec<Patch<Value>> {
        lock(&self.shared.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.shared.calls).len()
    }
}

#[async_trait]
impl PersistenceSink for GatedSink {
    type Value = Value;

    async fn persist(&self, patch: Patch<Value>) -> Result<()> {
        lock(&self.shared.calls).push(patch);
        self.shared.entered.notify_one();

        let permit = self
            .shared
            .release
            .acquire()
            .await
            .map_err(|_| anyhow!("gated sink: gate closed"))?;
        permit.forget();

        let outcome = lock(&self.shared.outcomes).pop_front().flatten();
        match outcome {
            Some(msg) => bail!("{msg}"),
            None => Ok(()),
        }
    }
}
