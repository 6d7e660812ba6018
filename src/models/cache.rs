//! Local model cache scanning
//!
//! Cache structure:
//! ```text
//! ./.models/
//! ├── 1_2_0/
//! │   ├── meta.json
//! │   └── model/mobilenet_v2_140_224/saved_model.pb
//! └── 1_3_0/
//!     └── ...
//! ```
//!
//! Installs are prepared under a dot-prefixed temporary entry and committed
//! by rename, so a tag directory either holds a complete entry or does not
//! exist. Committed entries are never deleted here; cache growth is left to
//! external housekeeping.

use super::metadata::read_metadata;
use super::release::{Release, entry_dir, meta_path, model_path, replaced_entry_dir, staging_entry_dir};
use super::version::dir_ordinal;
use crate::error::{ModelError, ModelResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File whose presence marks a directory as a loadable TensorFlow SavedModel
pub const MARKER_FILE: &str = "saved_model.pb";

/// Whether `dir` contains the SavedModel marker file
pub fn looks_like_saved_model(dir: &Path) -> bool {
    dir.join(MARKER_FILE).is_file()
}

/// Extracted model directory of a cached release, if it is usable
pub fn valid_model_path(release: &Release) -> Option<PathBuf> {
    let entry = release.local_path()?;
    let path = model_path(entry, release).ok()?;
    looks_like_saved_model(&path).then_some(path)
}

/// One tag directory found under the cache root
#[derive(Debug, Clone, Serialize)]
pub struct CachedEntry {
    pub dir_name: String,
    pub path: PathBuf,
    /// Release from `meta.json`, if readable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<Release>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

impl CachedEntry {
    pub fn is_valid(&self) -> bool {
        self.model_path.is_some()
    }
}

/// Tag-named subdirectories of `root`, sorted by name
async fn tag_dirs(root: &Path) -> ModelResult<Vec<(String, PathBuf)>> {
    let mut entries = fs::read_dir(root).await.map_err(|e| {
        tracing::debug!(root = ?root, error = %e, "Cache root not readable");
        ModelError::NoCache {
            root: root.to_path_buf(),
        }
    })?;

    let mut dirs = Vec::new();
    // a partial listing could crown the wrong winner
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ModelError::io(root, e))?
    {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        dirs.push((name, entry.path()));
    }

    dirs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(dirs)
}

/// Newest cached release under `root`
///
/// The winner is picked by directory name alone; its `meta.json` then
/// supplies the actual release. A corrupt winner is reported, not skipped.
pub async fn latest(root: &Path) -> ModelResult<Release> {
    let mut winner: Option<(u64, PathBuf)> = None;
    for (name, path) in tag_dirs(root).await? {
        let ordinal = dir_ordinal(&name);
        if ordinal > winner.as_ref().map_or(0, |(best, _)| *best) {
            winner = Some((ordinal, path));
        }
    }

    let (_, entry) = winner.ok_or_else(|| ModelError::NoCache {
        root: root.to_path_buf(),
    })?;

    let release = read_metadata(&meta_path(&entry)).await?;
    Ok(release.with_local_path(entry))
}

/// Every tag directory under `root` with whatever metadata it has
pub async fn list_entries(root: &Path) -> ModelResult<Vec<CachedEntry>> {
    let mut listed = Vec::new();
    for (dir_name, path) in tag_dirs(root).await? {
        if dir_ordinal(&dir_name) == 0 {
            continue;
        }
        let release = match read_metadata(&meta_path(&path)).await {
            Ok(release) => Some(release.with_local_path(&path)),
            Err(e) => {
                tracing::debug!(entry = ?path, error = %e, "Skipping metadata for cache entry");
                None
            }
        };
        let model_path = release.as_ref().and_then(valid_model_path);
        listed.push(CachedEntry {
            dir_name,
            path,
            release,
            model_path,
        });
    }

    listed.sort_by_key(|entry| std::cmp::Reverse(dir_ordinal(&entry.dir_name)));
    Ok(listed)
}

/// Move the staging entry for `tag` into place as its tag directory
///
/// A previous entry for the same tag is parked aside first and restored if
/// the final rename fails. Returns the committed entry directory.
pub async fn commit_entry(root: &Path, tag: &str) -> ModelResult<PathBuf> {
    let staging = staging_entry_dir(root, tag);
    let entry = entry_dir(root, tag);
    let replaced = replaced_entry_dir(root, tag);

    discard_entry(&replaced).await?;
    let had_previous = fs::try_exists(&entry)
        .await
        .map_err(|e| ModelError::io(&entry, e))?;
    if had_previous {
        fs::rename(&entry, &replaced)
            .await
            .map_err(|e| ModelError::io(&entry, e))?;
    }

    if let Err(e) = fs::rename(&staging, &entry).await {
        if had_previous {
            let _ = fs::rename(&replaced, &entry).await;
        }
        return Err(ModelError::io(&staging, e));
    }

    if had_previous && let Err(e) = fs::remove_dir_all(&replaced).await {
        tracing::warn!(entry = ?replaced, error = %e, "Unable to remove replaced cache entry");
    }
    Ok(entry)
}

/// Remove a temporary entry; a missing one is fine
pub async fn discard_entry(dir: &Path) -> ModelResult<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ModelError::io(dir, e)),
    }
}
