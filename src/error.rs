//! Error types for model resolution

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Failure categories of the acquisition engine
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no cached models under {root:?}")]
    NoCache { root: PathBuf },

    #[error("cache metadata at {path:?} is unreadable: {reason}")]
    CorruptMetadata { path: PathBuf, reason: String },

    #[error("no assets for release '{tag}'")]
    NoAssets { tag: String },

    #[error("bad status {status} from {url}")]
    BadStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("failed to download model '{tag}': {source}")]
    DownloadFailed {
        tag: String,
        #[source]
        source: Box<ModelError>,
    },

    #[error("failed to unpack {archive:?}: {reason}")]
    UnpackFailed { archive: PathBuf, reason: String },

    #[error("{path:?} does not look like a TensorFlow SavedModel")]
    InvalidLayout { path: PathBuf },

    #[error("NSFW_MODEL_PATH set but not a SavedModel: {path:?}")]
    InvalidOverride { path: PathBuf },

    #[error("timed out after {after:?} waiting for cache lock {path:?}")]
    LockTimeout { path: PathBuf, after: Duration },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModelError {
    /// Attach a path to an I/O error
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error means "nothing usable is cached"
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::NoCache { .. } | Self::CorruptMetadata { .. })
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
