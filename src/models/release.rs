//! Release descriptions and cache-entry path layout
//!
//! Layout of one cache entry:
//! ```text
//! <root>/
//! └── 1_2_0/                      tag with "." replaced by "_"
//!     ├── meta.json               persisted Release
//!     ├── model.zip               transient, removed after extraction
//!     └── model/
//!         └── mobilenet_v2_140_224/
//!             └── saved_model.pb  marker file
//! ```
//!
//! An entry is prepared under `<root>/.1_2_0.partial/` and renamed to its
//! tag directory only once it holds a valid model. Dot-prefixed names never
//! parse as a tag, so the cache scan ignores them.

use crate::config::FallbackRelease;
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ARCHIVE_SUFFIX: &str = ".zip";
/// Older releases named their archive "<stem>.1.zip"
const LEGACY_SUFFIX: &str = ".1";

const MODEL_DIR: &str = "model";
const ARCHIVE_FILE: &str = "model.zip";
const META_FILE: &str = "meta.json";

/// One downloadable file of a release
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "browser_download_url", default)]
    pub download_url: String,
}

/// One published version of the model
///
/// Identity is the tag plus the asset list. `local_path` is attached by the
/// resolver and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Release {
    #[serde(rename = "tag_name", default)]
    pub tag: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(skip)]
    local_path: Option<PathBuf>,
}

impl PartialEq for Release {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.assets == other.assets
    }
}

impl Eq for Release {}

impl Release {
    pub fn new(tag: impl Into<String>, assets: Vec<Asset>) -> Self {
        Self {
            tag: tag.into(),
            assets,
            local_path: None,
        }
    }

    /// Built-in release used when the feed is disabled or unusable
    pub fn fallback(fallback: &FallbackRelease) -> Self {
        Self::new(
            fallback.tag.clone(),
            vec![Asset {
                id: 0,
                name: fallback.asset_name.clone(),
                download_url: fallback.asset_url.clone(),
            }],
        )
    }

    /// Attach the cache entry this release lives in
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// The asset that gets downloaded; only the first one is used
    pub fn first_asset(&self) -> ModelResult<&Asset> {
        self.assets.first().ok_or_else(|| ModelError::NoAssets {
            tag: self.tag.clone(),
        })
    }
}

/// Cache directory name for a tag ("1.2.0" -> "1_2_0")
pub fn tag_dir_name(tag: &str) -> String {
    tag.replace('.', "_")
}

pub fn entry_dir(root: &Path, tag: &str) -> PathBuf {
    root.join(tag_dir_name(tag))
}

/// Temporary entry an install is prepared in before it is committed
pub fn staging_entry_dir(root: &Path, tag: &str) -> PathBuf {
    root.join(format!(".{}.partial", tag_dir_name(tag)))
}

/// Where a previous entry for the same tag is parked while being replaced
pub fn replaced_entry_dir(root: &Path, tag: &str) -> PathBuf {
    root.join(format!(".{}.replaced", tag_dir_name(tag)))
}

pub fn model_folder(entry: &Path) -> PathBuf {
    entry.join(MODEL_DIR)
}

pub fn archive_path(entry: &Path) -> PathBuf {
    entry.join(ARCHIVE_FILE)
}

pub fn meta_path(entry: &Path) -> PathBuf {
    entry.join(META_FILE)
}

/// Extracted folder name for an asset file name
///
/// "mobilenet_v2_140_224.1.zip" -> "mobilenet_v2_140_224"
pub fn asset_stem(name: &str) -> &str {
    let inner = name.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(name);
    inner.strip_suffix(LEGACY_SUFFIX).unwrap_or(inner)
}

/// Directory the model of `release` is extracted to inside `entry`
pub fn model_path(entry: &Path, release: &Release) -> ModelResult<PathBuf> {
    let asset = release.first_asset()?;
    Ok(model_folder(entry).join(asset_stem(&asset.name)))
}
