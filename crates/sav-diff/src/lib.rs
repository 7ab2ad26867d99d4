//! sav-diff
//!
//! Structural diff between two snapshots of the same shape.
//!
//! - Mappings are compared key by key, recursing into nested mappings.
//! - Sequences are atomic: replaced wholesale when any element differs.
//! - Everything else is a primitive compared with `PartialEq`.
//! - Only the baseline's keys are visited unless the additive variant is used.
//!
//! Deterministic, pure logic. No IO.

mod apply;
mod diff;
mod patch;
mod value;

pub use apply::{apply_patch, ApplyReport};
pub use diff::{structural_diff, structural_diff_with_additions};
pub use patch::{Change, Diff, Patch};
pub use value::{Shape, Structural};
