use std::path::Path;

use anyhow::{Context, Result};
use sav_diff::{structural_diff, structural_diff_with_additions};

use super::read_json_file;

/// `savable diff`: print the patch (compact JSON, `{}` when unchanged) or
/// the changed leaf pointers.
pub fn run(baseline: &str, candidate: &str, with_additions: bool, pointers: bool) -> Result<()> {
    let a = read_json_file(Path::new(baseline))?;
    let b = read_json_file(Path::new(candidate))?;

    let diff = if with_additions {
        structural_diff_with_additions(&a, &b)
    } else {
        structural_diff(&a, &b)
    };
    tracing::debug!(changed = diff.is_changed(), with_additions, "diff computed");

    if pointers {
        for p in diff.patch().map(|p| p.leaf_pointers()).unwrap_or_default() {
            println!("{p}");
        }
    } else {
        let out = serde_json::to_string(&diff).context("serialize patch failed")?;
        println!("{out}");
    }
    Ok(())
}
