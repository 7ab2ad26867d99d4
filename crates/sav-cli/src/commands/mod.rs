//! Command handler modules for sav-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod diff;
pub mod edit;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sav_config::LoadedConfig;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Read a JSON document from disk. A leading UTF-8 BOM is tolerated.
pub fn read_json_file(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).with_context(|| format!("read json file failed: {}", path.display()))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    let raw = std::str::from_utf8(bytes)
        .with_context(|| format!("json file must be UTF-8 text: {}", path.display()))?;
    serde_json::from_str(raw.trim())
        .with_context(|| format!("json file must contain valid JSON: {}", path.display()))
}

/// Layered config from `--config` paths; no paths means every option at its default.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return LoadedConfig::empty();
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    sav_config::load_layered_yaml(&path_refs)
}

/// Parse a `KEY=JSON` assignment. The value must be valid JSON, so strings
/// need their quotes: `title="draft"`.
pub fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("invalid --set '{raw}'. expected KEY=JSON"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("invalid --set '{raw}'. key must not be empty");
    }
    let value: Value = serde_json::from_str(value.trim())
        .with_context(|| format!("invalid --set '{raw}'. value must be valid JSON"))?;
    Ok((key.to_string(), value))
}
