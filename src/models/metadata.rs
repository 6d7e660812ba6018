//! Per-entry release metadata (`meta.json`)
//!
//! The metadata file is the only source of truth for which release a cache
//! entry holds; the directory name is just an approximation of the tag.

use super::release::Release;
use crate::error::{ModelError, ModelResult};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Read the release persisted at `path`
///
/// A missing or unparseable file is reported as corrupt metadata.
pub async fn read_metadata(path: &Path) -> ModelResult<Release> {
    let content = fs::read(path)
        .await
        .map_err(|e| ModelError::CorruptMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    serde_json::from_slice(&content).map_err(|e| ModelError::CorruptMetadata {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Persist `release` to `path` atomically
pub async fn write_metadata(path: &Path, release: &Release) -> ModelResult<()> {
    let data = serde_json::to_vec(release).map_err(|e| {
        ModelError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    // Atomic write: write to temp file, then rename
    let temp_file = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_file)
        .await
        .map_err(|e| ModelError::io(&temp_file, e))?;
    file.write_all(&data)
        .await
        .map_err(|e| ModelError::io(&temp_file, e))?;
    file.sync_all()
        .await
        .map_err(|e| ModelError::io(&temp_file, e))?;

    fs::rename(&temp_file, path)
        .await
        .map_err(|e| ModelError::io(path, e))?;

    Ok(())
}
