use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use sav_diff::{apply_patch, Patch};
use sav_engine::{PersistenceSink, SnapshotProvider};
use serde_json::Value;

use crate::lock;

/// In-memory backing document.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

struct StoreInner {
    doc: Value,
    reads: usize,
    writes: Vec<Patch<Value>>,
    fail_next_write: Option<String>,
    fail_reads: bool,
}

impl MemoryStore {
    pub fn new(doc: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                doc,
                reads: 0,
                writes: Vec::new(),
                fail_next_write: None,
                fail_reads: false,
            })),
        }
    }

    /// Current backing document.
    pub fn document(&self) -> Value {
        lock(&self.inner).doc.clone()
    }

    /// Replace the backing document, as another writer would.
    pub fn replace(&self, doc: Value) {
        lock(&self.inner).doc = doc;
    }

    /// Number of provider reads served.
    pub fn reads(&self) -> usize {
        lock(&self.inner).reads
    }

    /// Patches accepted so far, in order.
    pub fn writes(&self) -> Vec<Patch<Value>> {
        lock(&self.inner).writes.clone()
    }

    /// Make the next persist call fail with `msg` (one-shot).
    pub fn fail_next_write(&self, msg: impl Into<String>) {
        lock(&self.inner).fail_next_write = Some(msg.into());
    }

    /// Make provider reads fail until switched off again.
    pub fn fail_reads(&self, on: bool) {
        lock(&self.inner).fail_reads = on;
    }
}

impl SnapshotProvider for MemoryStore {
    type Value = Value;

    fn snapshot(&self) -> Result<Value> {
        let mut inner = lock(&self.inner);
        if inner.fail_reads {
            bail!("memory store: read refused");
        }
        inner.reads += 1;
        Ok(inner.doc.clone())
    }
}

#[async_trait]
impl PersistenceSink for MemoryStore {
    type Value = Value;

    async fn persist(&self, patch: Patch<Value>) -> Result<()> {
        let mut inner = lock(&self.inner);
        if let Some(msg) = inner.fail_next_write.take() {
            bail!("{msg}");
        }
        let report = apply_patch(&mut inner.doc, &patch);
        inner.writes.push(patch);
        if !report.is_complete() {
            bail!("memory store: patch applied partially, skipped {:?}", report.skipped);
        }
        Ok(())
    }
}
