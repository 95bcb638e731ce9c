//! Local export of the snapshot document as `unified.json`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::Snapshot;

pub const EXPORT_FILE_NAME: &str = "unified.json";

/// Write the snapshot into `dir/unified.json` (pretty JSON) and return the
/// full path. The file is written to a temp name first and renamed over.
pub fn write_unified(snapshot: &Snapshot, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let target = dir.join(EXPORT_FILE_NAME);
    let tmp = dir.join(format!(".{EXPORT_FILE_NAME}.tmp"));

    let payload = snapshot.to_json_pretty().context("serializing snapshot")?;
    fs::write(&tmp, payload).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, &target).with_context(|| format!("moving snapshot to {}", target.display()))?;

    tracing::info!(path = %target.display(), items = snapshot.item_count(), "unified.json written");
    Ok(target)
}
