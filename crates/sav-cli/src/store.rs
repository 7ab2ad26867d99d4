//! File-backed store: one JSON document on disk, used as both snapshot
//! provider and persistence sink by `savable edit`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sav_diff::{apply_patch, Patch};
use sav_engine::{PersistenceSink, SnapshotProvider};
use serde_json::Value;
use tracing::debug;

use crate::commands::read_json_file;

#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    pretty: bool,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            path: path.into(),
            pretty,
        }
    }

    fn write(&self, doc: &Value) -> Result<()> {
        let mut body = if self.pretty {
            serde_json::to_string_pretty(doc)
        } else {
            serde_json::to_string(doc)
        }
        .context("serialize document failed")?;
        body.push('\n');

        // Temp file + rename: readers never see a half-written document.
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, body).with_context(|| format!("write temp file failed: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace {} failed", self.path.display()))?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl SnapshotProvider for FileStore {
    type Value = Value;

    fn snapshot(&self) -> Result<Value> {
        read_json_file(&self.path)
    }
}

#[async_trait]
impl PersistenceSink for FileStore {
    type Value = Value;

    /// Re-reads the file and applies the patch on top, so fields nobody
    /// edited keep whatever is on disk now.
    async fn persist(&self, patch: Patch<Value>) -> Result<()> {
        let mut doc = read_json_file(&self.path)?;
        let report = apply_patch(&mut doc, &patch);
        if !report.is_complete() {
            bail!(
                "patch does not fit {}: skipped {:?}",
                self.path.display(),
                report.skipped
            );
        }
        self.write(&doc)?;
        debug!(path = %self.path.display(), applied = ?report.applied, "document written");
        Ok(())
    }
}
