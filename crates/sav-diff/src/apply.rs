//! Applying a [`Patch`] to a value in place.
//!
//! Stores use this to model what a persistence sink does with a patch: set
//! the changed fields, descend into nested patches, drop removed keys.
//! Nothing is created implicitly: a nested patch aimed at a field that is
//! missing or not a mapping is skipped and reported.

use crate::patch::escape_pointer_token;
use crate::{Change, Patch, Structural};

/// Outcome of [`apply_patch`], as JSON pointers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

impl ApplyReport {
    /// `true` when every change in the patch landed.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub fn apply_patch<V: Structural>(base: &mut V, patch: &Patch<V>) -> ApplyReport {
    let mut report = ApplyReport::default();
    apply_at(base, patch, "", &mut report);
    report
}

fn apply_at<V: Structural>(target: &mut V, patch: &Patch<V>, prefix: &str, report: &mut ApplyReport) {
    for (key, change) in patch.iter() {
        let pointer = format!("{}/{}", prefix, escape_pointer_token(key));
        match change {
            Change::Set(value) => {
                if target.set_field(key, value.clone()) {
                    report.applied.push(pointer);
                } else {
                    report.skipped.push(pointer);
                }
            }
            Change::Removed => {
                if target.is_mapping() {
                    target.remove_field(key);
                    report.applied.push(pointer);
                } else {
                    report.skipped.push(pointer);
                }
            }
            Change::Nested(inner) => match target.field_mut(key) {
                Some(child) if child.is_mapping() => apply_at(child, inner, &pointer, report),
                _ => report.skipped.push(pointer),
            },
        }
    }
}
