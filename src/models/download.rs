//! Release asset download
//!
//! The body of the release's first asset is streamed to `<dest>.part` and
//! renamed onto the destination only once complete, so an interrupted
//! download never looks like a finished archive. A leftover `.part` file is
//! truncated by the next attempt.

use super::release::{ARCHIVE_SUFFIX, Release};
use crate::error::{ModelError, ModelResult};
use futures::StreamExt;
use reqwest::Client;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

#[derive(Debug)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes_downloaded: u64,
}

/// Download the first asset of `release` to `destination`
///
/// `destination` gets a `.zip` suffix if it lacks one. The whole transfer is
/// bounded by `timeout`.
pub async fn download_asset(
    client: &Client,
    release: &Release,
    destination: &Path,
    timeout: Duration,
) -> ModelResult<DownloadOutcome> {
    let asset = release.first_asset()?;
    let destination = with_archive_suffix(destination);

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ModelError::io(parent, e))?;
    }

    tracing::info!(
        tag = %release.tag,
        asset = %asset.name,
        url = %asset.download_url,
        "Downloading model archive"
    );

    let part = part_path(&destination);
    let bytes_downloaded = tokio::time::timeout(
        timeout,
        stream_to_file(client, &asset.download_url, &part),
    )
    .await
    .map_err(|_| ModelError::Timeout {
        url: asset.download_url.clone(),
        after: timeout,
    })??;

    fs::rename(&part, &destination)
        .await
        .map_err(|e| ModelError::io(&destination, e))?;

    tracing::info!(path = ?destination, bytes = bytes_downloaded, "Download complete");

    Ok(DownloadOutcome {
        path: destination,
        bytes_downloaded,
    })
}

async fn stream_to_file(client: &Client, url: &str, path: &Path) -> ModelResult<u64> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ModelError::BadStatus {
            url: url.to_string(),
            status,
        });
    }

    let mut file = File::create(path)
        .await
        .map_err(|e| ModelError::io(path, e))?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ModelError::io(path, e))?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| ModelError::io(path, e))?;
    Ok(downloaded)
}

fn with_archive_suffix(path: &Path) -> PathBuf {
    if path.to_string_lossy().ends_with(ARCHIVE_SUFFIX) {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(ARCHIVE_SUFFIX);
    PathBuf::from(name)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}
