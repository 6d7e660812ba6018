//! Shared fixtures for resolver integration tests
//!
//! An in-process release server that serves a GitHub-style "latest release"
//! document and asset archives, counting every hit.

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use nsfw_model_manager::ResolverConfig;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use zip::write::{FileOptions, ZipWriter};

pub const FALLBACK_ASSET: &str = "mobilenet_v2_140_224.1.zip";
pub const MODEL_STEM: &str = "mobilenet_v2_140_224";

/// What the feed endpoint answers with
#[derive(Debug, Clone)]
pub enum FeedReply {
    Release(Value),
    Status(StatusCode),
    Body(String),
}

pub struct FakeReleases {
    feed: Mutex<FeedReply>,
    assets: Mutex<HashMap<String, Vec<u8>>>,
    feed_hits: AtomicUsize,
    asset_hits: AtomicUsize,
}

impl FakeReleases {
    pub fn set_feed(&self, reply: FeedReply) {
        *self.feed.lock().unwrap() = reply;
    }

    pub fn put_asset(&self, name: &str, bytes: Vec<u8>) {
        self.assets.lock().unwrap().insert(name.to_string(), bytes);
    }

    pub fn feed_hits(&self) -> usize {
        self.feed_hits.load(Ordering::SeqCst)
    }

    pub fn asset_hits(&self) -> usize {
        self.asset_hits.load(Ordering::SeqCst)
    }
}

pub struct FakeServer {
    pub base_url: String,
    pub releases: Arc<FakeReleases>,
    handle: JoinHandle<()>,
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeServer {
    /// Start a server on an ephemeral localhost port
    pub async fn start() -> Self {
        let releases = Arc::new(FakeReleases {
            feed: Mutex::new(FeedReply::Status(StatusCode::SERVICE_UNAVAILABLE)),
            assets: Mutex::new(HashMap::new()),
            feed_hits: AtomicUsize::new(0),
            asset_hits: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/repos/releases/latest", get(feed))
            .route("/download/{name}", get(asset))
            .with_state(releases.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake release server");
        let addr = listener.local_addr().expect("Failed to read local addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Fake release server failed");
        });

        Self {
            base_url: format!("http://{}", addr),
            releases,
            handle,
        }
    }

    pub fn feed_url(&self) -> String {
        format!("{}/repos/releases/latest", self.base_url)
    }

    pub fn asset_url(&self, name: &str) -> String {
        format!("{}/download/{}", self.base_url, name)
    }

    /// Feed document for `tag` with a single asset served by this server
    pub fn release_json(&self, tag: &str, asset_name: &str) -> Value {
        json!({
            "tag_name": tag,
            "name": format!("Release {tag}"),
            "prerelease": false,
            "assets": [{
                "id": 4242,
                "name": asset_name,
                "size": 0,
                "browser_download_url": self.asset_url(asset_name),
            }]
        })
    }

    /// Config pointing the feed and the fallback asset at this server
    pub fn config(&self, cache_dir: &std::path::Path) -> ResolverConfig {
        let mut config = ResolverConfig {
            cache_dir: cache_dir.to_path_buf(),
            releases_url: self.feed_url(),
            feed_timeout_secs: 5,
            download_timeout_secs: 30,
            lock_timeout_secs: 60,
            ..Default::default()
        };
        config.fallback.asset_url = self.asset_url(FALLBACK_ASSET);
        config
    }
}

async fn feed(State(releases): State<Arc<FakeReleases>>) -> Response {
    releases.feed_hits.fetch_add(1, Ordering::SeqCst);
    let reply = releases.feed.lock().unwrap().clone();
    match reply {
        FeedReply::Release(body) => Json(body).into_response(),
        FeedReply::Status(status) => status.into_response(),
        FeedReply::Body(body) => (StatusCode::OK, body).into_response(),
    }
}

async fn asset(
    State(releases): State<Arc<FakeReleases>>,
    Path(name): Path<String>,
) -> Response {
    releases.asset_hits.fetch_add(1, Ordering::SeqCst);
    let bytes = releases.assets.lock().unwrap().get(&name).cloned();
    match bytes {
        Some(bytes) => bytes.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// HTTP client that never routes localhost through a proxy
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("Failed to build test client")
}

/// Zip archive laid out like a released SavedModel
pub fn saved_model_zip(stem: &str) -> Vec<u8> {
    zip_with(
        &[format!("{stem}/"), format!("{stem}/variables/")],
        &[
            (format!("{stem}/saved_model.pb"), b"saved-model".to_vec()),
            (
                format!("{stem}/variables/variables.data-00000-of-00001"),
                vec![0u8; 256],
            ),
            (format!("{stem}/variables/variables.index"), b"index".to_vec()),
        ],
    )
}

/// Zip archive whose model folder lacks the marker file
pub fn markerless_zip(stem: &str) -> Vec<u8> {
    zip_with(
        &[format!("{stem}/")],
        &[(format!("{stem}/model.tflite"), b"flat".to_vec())],
    )
}

fn zip_with(dirs: &[String], files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for dir in dirs {
        zip.add_directory(dir.as_str(), FileOptions::default())
            .unwrap();
    }
    for (name, data) in files {
        zip.start_file(name.as_str(), FileOptions::default())
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
