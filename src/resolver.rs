//! End-to-end model path resolution
//!
//! One call walks these steps once, in order, and keeps nothing in memory
//! between calls beyond what it wrote to the cache:
//!
//! 1. explicit override path, validated and returned as-is
//! 2. newest valid cache entry
//! 3. remote latest release (or the fallback release)
//! 4. keep the cache unless forced or the remote tag is strictly newer
//! 5. under the cache lock: download, persist metadata, unpack and validate
//!    in a staging entry, then rename it into place

use crate::config::ResolverConfig;
use crate::error::{ModelError, ModelResult};
use crate::models::archive;
use crate::models::cache::{self, looks_like_saved_model, valid_model_path};
use crate::models::download::download_asset;
use crate::models::feed::ReleaseResolver;
use crate::models::lock::CacheLock;
use crate::models::metadata::write_metadata;
use crate::models::release::{
    Release, archive_path, entry_dir, meta_path, model_path, staging_entry_dir,
};
use crate::models::version::is_newer;
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Validated directory containing a loadable SavedModel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPath(PathBuf);

impl ModelPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for ModelPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A cache entry that passed marker validation
struct CachedModel {
    release: Release,
    path: PathBuf,
}

/// Resolves, downloads and caches the model
pub struct ModelPathResolver {
    config: ResolverConfig,
    client: Client,
}

impl ModelPathResolver {
    /// Create a resolver with its own HTTP client
    pub fn new(config: ResolverConfig) -> ModelResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.feed_timeout())
            .build()?;
        Ok(Self::with_client(config, client))
    }

    /// Create a resolver around a caller-built HTTP client
    pub fn with_client(config: ResolverConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Newest cached model, without any network access
    pub async fn local_model_path(&self) -> ModelResult<ModelPath> {
        let cached = cache::latest(&self.config.cache_dir).await?;
        let entry = cached.local_path().unwrap_or(self.config.cache_dir.as_path());
        let path = model_path(entry, &cached)?;
        if !looks_like_saved_model(&path) {
            return Err(ModelError::InvalidLayout { path });
        }
        Ok(ModelPath(path))
    }

    /// Resolve a validated local model directory
    pub async fn resolve(&self) -> ModelResult<ModelPath> {
        if let Some(path) = &self.config.model_path_override {
            if looks_like_saved_model(path) {
                tracing::info!(path = ?path, "Using NSFW model at NSFW_MODEL_PATH");
                return Ok(ModelPath(path.clone()));
            }
            return Err(ModelError::InvalidOverride { path: path.clone() });
        }

        let force = self.config.force_update;
        let cached = self.valid_cache().await;

        if let Some(cached) = &cached
            && self.config.prefer_cache
            && !force
        {
            tracing::info!(tag = %cached.release.tag, "Using cached NSFW model");
            return Ok(ModelPath(cached.path.clone()));
        }

        tracing::info!("Resolving latest NSFW release (remote or fallback)");
        let latest = ReleaseResolver::new(&self.client, &self.config)
            .remote_or_fallback()
            .await;

        if let Some(cached) = &cached
            && !force
            && !is_newer(&latest.tag, &cached.release.tag)
        {
            tracing::info!(
                cached = %cached.release.tag,
                remote = %latest.tag,
                "Cached model is up to date; sticking with cache"
            );
            return Ok(ModelPath(cached.path.clone()));
        }

        self.install(latest, cached).await
    }

    /// Newest cache entry if its model folder carries the marker file
    async fn valid_cache(&self) -> Option<CachedModel> {
        match cache::latest(&self.config.cache_dir).await {
            Ok(release) => match valid_model_path(&release) {
                Some(path) => Some(CachedModel { release, path }),
                None => {
                    tracing::warn!(tag = %release.tag, "Newest cache entry has no usable model");
                    None
                }
            },
            Err(e @ ModelError::NoCache { .. }) => {
                tracing::debug!(error = %e, "No cached model");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable cache");
                None
            }
        }
    }

    /// Download, unpack and validate `latest` into its cache entry
    ///
    /// Everything happens in the tag's staging entry, which is renamed into
    /// place only once it holds a valid model. A failed install therefore
    /// never leaves a tag directory behind that could shadow an older entry.
    async fn install(&self, latest: Release, cached: Option<CachedModel>) -> ModelResult<ModelPath> {
        let root = &self.config.cache_dir;
        let _lock = match CacheLock::acquire(
            root,
            self.config.lock_timeout(),
            self.config.lock_stale_after(),
        )
        .await
        {
            Ok(lock) => lock,
            Err(e) => return degrade_to_cache(e, cached),
        };

        let entry = entry_dir(root, &latest.tag);
        let release = latest.with_local_path(&entry);

        // another resolution may have installed it while we waited
        if !self.config.force_update
            && let Some(path) = valid_model_path(&release)
        {
            tracing::info!(tag = %release.tag, "Model was installed concurrently");
            return Ok(ModelPath(path));
        }

        let staging = staging_entry_dir(root, &release.tag);
        tracing::info!(tag = %release.tag, staging = ?staging, "Preparing model");
        // leftovers of an earlier failed or cancelled attempt
        cache::discard_entry(&staging).await?;
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| ModelError::io(&staging, e))?;

        if let Err(e) = download_asset(
            &self.client,
            &release,
            &archive_path(&staging),
            self.config.download_timeout(),
        )
        .await
        {
            if let Err(cleanup) = cache::discard_entry(&staging).await {
                tracing::warn!(error = %cleanup, "Unable to remove staging entry");
            }
            let err = ModelError::DownloadFailed {
                tag: release.tag.clone(),
                source: Box::new(e),
            };
            return degrade_to_cache(err, cached);
        }

        if let Err(e) = write_metadata(&meta_path(&staging), &release).await {
            tracing::warn!(error = %e, "Failed to write meta.json");
        }

        // a corrupt archive stays in the staging entry for inspection
        archive::unpack(&staging).await?;

        let staged = model_path(&staging, &release)?;
        if !looks_like_saved_model(&staged) {
            if let Err(e) = cache::discard_entry(&staging).await {
                tracing::warn!(error = %e, "Unable to remove staging entry");
            }
            return Err(ModelError::InvalidLayout { path: staged });
        }

        let entry = cache::commit_entry(root, &release.tag).await?;
        let path = model_path(&entry, &release)?;
        tracing::info!(tag = %release.tag, path = ?path, "Model cached successfully");
        Ok(ModelPath(path))
    }
}

/// Fall back to a valid cached model when installing a new one failed early
fn degrade_to_cache(err: ModelError, cached: Option<CachedModel>) -> ModelResult<ModelPath> {
    match cached {
        Some(cached) => {
            tracing::warn!(
                error = %err,
                tag = %cached.release.tag,
                "Install failed; using cached model"
            );
            Ok(ModelPath(cached.path))
        }
        None => Err(err),
    }
}
