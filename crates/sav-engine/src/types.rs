use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which keys the change computation visits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMode {
    /// Only keys of the Saved snapshot (`structural_diff`).
    #[default]
    BaselineKeys,
    /// Also keys that exist only in Current (`structural_diff_with_additions`).
    WithAdditions,
}

/// Per-engine behaviour switches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SavableOptions {
    /// Re-read Saved from the provider after the sink confirms a save.
    ///
    /// Off by default: the caller (or an external refresh) is expected to
    /// re-sync the baseline once the backing data has been updated.
    pub refresh_after_save: bool,

    pub diff_mode: DiffMode,

    /// Fail fast when the provider (or an `edit`) changes the top-level key
    /// set established at construction.
    pub enforce_shape: bool,
}

impl Default for SavableOptions {
    fn default() -> Self {
        Self {
            refresh_after_save: false,
            diff_mode: DiffMode::BaselineKeys,
            enforce_shape: true,
        }
    }
}

/// Save state machine: `Idle -> Saving -> Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Saving,
}

/// What a call to `save` did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The sink accepted a patch touching `fields` top-level fields.
    Saved { fields: usize },
    /// Nothing to persist; the sink was not called.
    NoChanges,
    /// Another save was in flight; this call was dropped (not queued).
    AlreadySaving,
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

#[derive(Debug, Error)]
pub enum SavableError {
    #[error("snapshot provider failed: {0:#}")]
    Provider(anyhow::Error),

    #[error("persistence sink failed: {0:#}")]
    Sink(anyhow::Error),

    #[error("snapshot root is not a mapping")]
    NotAMapping,

    #[error("snapshot shape changed: missing={missing:?} unexpected={unexpected:?}")]
    ShapeMismatch {
        missing: BTreeSet<String>,
        unexpected: BTreeSet<String>,
    },

    #[error("unknown field '{0}'")]
    UnknownField(String),
}

impl SavableError {
    /// `true` for failures reported by a collaborator rather than the engine.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, SavableError::Provider(_) | SavableError::Sink(_))
    }
}
