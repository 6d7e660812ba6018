//! Advisory lock on a cache root
//!
//! Download and extraction into the cache hold `<root>/.lock`, created with
//! `create_new` so only one holder exists across processes. The file holds
//! a token unique to its holder and is removed when the guard drops, unless
//! someone else's token is in it by then. A lock file older than
//! `stale_after` is considered abandoned by a crashed holder and broken, so
//! `stale_after` must exceed the longest time a live holder keeps it.

use crate::error::{ModelError, ModelResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const LOCK_FILE: &str = ".lock";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(0);

/// Held lock; released on drop
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
    token: String,
}

impl CacheLock {
    /// Acquire the lock for `root`, waiting up to `timeout`
    pub async fn acquire(root: &Path, timeout: Duration, stale_after: Duration) -> ModelResult<Self> {
        fs::create_dir_all(root)
            .await
            .map_err(|e| ModelError::io(root, e))?;

        let path = root.join(LOCK_FILE);
        let deadline = Instant::now() + timeout;
        let mut waiting = false;

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let token = holder_token();
                    if let Err(e) = file.write_all(token.as_bytes()).await {
                        drop(file);
                        let _ = fs::remove_file(&path).await;
                        return Err(ModelError::io(&path, e));
                    }
                    tracing::debug!(lock = ?path, token = %token, "Acquired cache lock");
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&path, stale_after).await {
                        tracing::warn!(lock = ?path, "Breaking stale cache lock");
                        let _ = fs::remove_file(&path).await;
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(ModelError::LockTimeout {
                            path,
                            after: timeout,
                        });
                    }
                    if !waiting {
                        tracing::info!(lock = ?path, "Waiting for another resolution to finish");
                        waiting = true;
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(ModelError::io(&path, e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(holder) if holder == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::warn!(lock = ?self.path, error = %e, "Failed to release cache lock");
                }
            }
            Ok(holder) => {
                tracing::warn!(lock = ?self.path, holder = %holder, "Cache lock was taken over; leaving it");
            }
            Err(e) => {
                tracing::warn!(lock = ?self.path, error = %e, "Cache lock vanished before release");
            }
        }
    }
}

/// "<pid>:<nanos>:<counter>", distinct for every acquisition
fn holder_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let id = NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed);
    format!("{}:{}:{}", std::process::id(), nanos, id)
}

async fn is_stale(path: &Path, max_age: Duration) -> bool {
    let Ok(metadata) = fs::metadata(path).await else {
        return false;
    };
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > max_age)
}
