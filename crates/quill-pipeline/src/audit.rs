//! Run log persistence.
//!
//! [`save_run_log`] writes a finished [`FinalResult`] to `<dir>/run.json` so a
//! run can be inspected after the process exits. [`load_run_log`] reads it
//! back.

use std::path::{Path, PathBuf};

use quill_types::Result;

use crate::runner::FinalResult;

const RUN_LOG: &str = "run.json";

/// Save the run log to the given directory, creating it if needed.
pub async fn save_run_log(result: &FinalResult, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(RUN_LOG);
    let json = serde_json::to_string_pretty(result)?;
    tokio::fs::write(&path, json).await?;
    tracing::debug!(path = %path.display(), "Run log saved");
    Ok(path)
}

/// Load the run log from a directory. Returns `Ok(None)` when no log exists.
pub async fn load_run_log(dir: &Path) -> Result<Option<FinalResult>> {
    let path = dir.join(RUN_LOG);
    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }
    let json = tokio::fs::read_to_string(&path).await?;
    let result: FinalResult = serde_json::from_str(&json)?;
    Ok(Some(result))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
