//! Remote release feed with built-in fallback
//!
//! Resolution never fails outward: a disabled feed, a network error, a
//! non-success status, a timeout or an undecodable body all yield the
//! configured fallback release.

use super::release::Release;
use crate::config::ResolverConfig;
use crate::error::{ModelError, ModelResult};
use reqwest::Client;

/// Resolves what "remote latest" currently is
pub struct ReleaseResolver<'a> {
    client: &'a Client,
    config: &'a ResolverConfig,
}

impl<'a> ReleaseResolver<'a> {
    pub fn new(client: &'a Client, config: &'a ResolverConfig) -> Self {
        Self { client, config }
    }

    /// The remote latest release, or the fallback release
    pub async fn remote_or_fallback(&self) -> Release {
        if self.config.skip_remote {
            tracing::info!(tag = %self.config.fallback.tag, "Remote lookup disabled, using fallback release");
            return self.fallback();
        }

        match self.fetch_latest().await {
            Ok(release) => {
                tracing::info!(tag = %release.tag, assets = release.assets.len(), "Resolved remote release");
                release
            }
            Err(e) => {
                tracing::warn!(
                    url = %self.config.releases_url,
                    error = %e,
                    tag = %self.config.fallback.tag,
                    "Release feed unusable, using fallback release"
                );
                self.fallback()
            }
        }
    }

    pub fn fallback(&self) -> Release {
        Release::fallback(&self.config.fallback)
    }

    async fn fetch_latest(&self) -> ModelResult<Release> {
        let url = &self.config.releases_url;
        let timeout = self.config.feed_timeout();

        let request = async {
            let response = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(ModelError::BadStatus {
                    url: url.clone(),
                    status,
                });
            }

            Ok::<_, ModelError>(response.json::<Release>().await?)
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| ModelError::Timeout {
                url: url.clone(),
                after: timeout,
            })?
    }
}
