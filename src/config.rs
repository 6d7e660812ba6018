//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Resolver configuration, built once and handed to the resolver
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Use this directory as-is and skip every other resolution step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path_override: Option<PathBuf>,
    /// Re-download even when the cache is current
    pub force_update: bool,
    pub cache_dir: PathBuf,
    /// Never contact the release feed; always use the fallback release
    pub skip_remote: bool,
    /// Return a valid cached model without querying the feed first
    pub prefer_cache: bool,
    pub releases_url: String,
    pub fallback: FallbackRelease,
    pub feed_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub lock_timeout_secs: u64,
}

/// Release used when the feed is disabled or unusable
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FallbackRelease {
    pub tag: String,
    pub asset_name: String,
    pub asset_url: String,
}

impl Default for FallbackRelease {
    fn default() -> Self {
        Self {
            tag: "1.2.0".to_string(),
            asset_name: "mobilenet_v2_140_224.1.zip".to_string(),
            asset_url: "https://github.com/GantMan/nsfw_model/releases/download/1.2.0/mobilenet_v2_140_224.1.zip".to_string(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            model_path_override: None,
            force_update: false,
            cache_dir: default_cache_dir(),
            skip_remote: false,
            prefer_cache: false,
            releases_url: default_releases_url(),
            fallback: FallbackRelease::default(),
            feed_timeout_secs: default_feed_timeout(),
            download_timeout_secs: default_download_timeout(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `NSFW_MODEL_*` overrides read through `lookup`
    ///
    /// Values are trimmed and empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |key: &str| get(key).map(|v| parse_bool(&v));

        if let Some(path) = get("NSFW_MODEL_PATH") {
            self.model_path_override = Some(PathBuf::from(path));
        }
        if let Some(force) = flag("NSFW_MODEL_FORCE_UPDATE") {
            self.force_update = force;
        }
        if let Some(dir) = get("NSFW_MODEL_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(skip) = flag("NSFW_MODEL_SKIP_REMOTE") {
            self.skip_remote = skip;
        }
        if let Some(prefer) = flag("NSFW_MODEL_PREFER_CACHE") {
            self.prefer_cache = prefer;
        }
        if let Some(url) = get("NSFW_MODEL_RELEASES_URL") {
            self.releases_url = url;
        }
        if let Some(tag) = get("NSFW_MODEL_FALLBACK_TAG") {
            self.fallback.tag = tag;
        }
        if let Some(name) = get("NSFW_MODEL_FALLBACK_NAME") {
            self.fallback.asset_name = name;
        }
        if let Some(url) = get("NSFW_MODEL_FALLBACK_URL") {
            self.fallback.asset_url = url;
        }
        if let Some(secs) = get("NSFW_MODEL_FEED_TIMEOUT_SECS") {
            self.feed_timeout_secs = secs
                .parse()
                .context("Invalid NSFW_MODEL_FEED_TIMEOUT_SECS value")?;
        }
        if let Some(secs) = get("NSFW_MODEL_DOWNLOAD_TIMEOUT_SECS") {
            self.download_timeout_secs = secs
                .parse()
                .context("Invalid NSFW_MODEL_DOWNLOAD_TIMEOUT_SECS value")?;
        }
        if let Some(secs) = get("NSFW_MODEL_LOCK_TIMEOUT_SECS") {
            self.lock_timeout_secs = secs
                .parse()
                .context("Invalid NSFW_MODEL_LOCK_TIMEOUT_SECS value")?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            anyhow::bail!("Cache directory cannot be empty");
        }
        if self.releases_url.is_empty() {
            anyhow::bail!("Releases feed URL cannot be empty");
        }
        if self.fallback.tag.is_empty() {
            anyhow::bail!("Fallback tag cannot be empty");
        }
        if self.fallback.asset_name.is_empty() || self.fallback.asset_url.is_empty() {
            anyhow::bail!("Fallback asset name and URL must both be set");
        }
        for (name, secs) in [
            ("feed_timeout_secs", self.feed_timeout_secs),
            ("download_timeout_secs", self.download_timeout_secs),
            ("lock_timeout_secs", self.lock_timeout_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{} must be > 0", name);
            }
        }
        // waiters must outlast one full download by the lock holder
        if self.lock_timeout_secs <= self.download_timeout_secs {
            anyhow::bail!(
                "lock_timeout_secs ({}) must be greater than download_timeout_secs ({})",
                self.lock_timeout_secs,
                self.download_timeout_secs
            );
        }

        Ok(())
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Age after which a cache lock counts as abandoned
    ///
    /// Longer than any live holder keeps it: one download plus the time
    /// allowed for unpacking and committing.
    pub fn lock_stale_after(&self) -> Duration {
        self.download_timeout() + self.lock_timeout()
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}

// Default functions
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./.models/")
}
fn default_releases_url() -> String {
    "https://api.github.com/repos/GantMan/nsfw_model/releases/latest".to_string()
}
fn default_feed_timeout() -> u64 {
    10
}
fn default_download_timeout() -> u64 {
    600
}
fn default_lock_timeout() -> u64 {
    900
}
