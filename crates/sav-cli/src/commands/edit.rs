use anyhow::Result;
use sav_config::{report_unused_keys, ConfigSurface, LoadedConfig, UnusedKeyPolicy};
use sav_engine::{Savable, SaveOutcome};
use tracing::{info, warn};

use super::parse_assignment;
use crate::store::FileStore;

/// `savable edit`: open a session on `file`, apply the assignments, save.
pub async fn run(file: &str, sets: &[String], config: &LoadedConfig, strict_config: bool) -> Result<()> {
    let policy = if strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(ConfigSurface::Cli, &config.config_json, policy)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config carries keys nothing reads");
    }

    let options = sav_config::options_from_config_json(&config.config_json)?;
    let pretty = sav_config::store_pretty_from_config_json(&config.config_json);

    let assignments = sets
        .iter()
        .map(|raw| parse_assignment(raw))
        .collect::<Result<Vec<_>>>()?;

    let store = FileStore::new(file, pretty);
    let session = Savable::with_options(store.clone(), store, options)?;
    info!(
        config_hash = %config.config_hash,
        options = ?session.options(),
        pretty,
        fields = session.fields().len(),
        "opened {file}"
    );
    for (key, value) in assignments {
        session.set_field(&key, value)?;
    }

    match session.save().await? {
        SaveOutcome::Saved { fields } => println!("saved=true fields={fields}"),
        SaveOutcome::NoChanges => println!("saved=false reason=no_changes"),
        SaveOutcome::AlreadySaving => println!("saved=false reason=already_saving"),
    }
    Ok(())
}
