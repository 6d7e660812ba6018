//! Model acquisition and cache management
//!
//! Provides functionality for:
//! - Ordering release tags
//! - Scanning the local cache for the newest entry
//! - Resolving the remote release feed with a built-in fallback
//! - Downloading and unpacking release archives
//! - Reading and writing per-entry metadata

pub mod archive;
pub mod cache;
pub mod download;
pub mod feed;
pub mod lock;
pub mod metadata;
pub mod release;
pub mod version;

pub use cache::{CachedEntry, MARKER_FILE, latest, list_entries, looks_like_saved_model};
pub use download::download_asset;
pub use feed::ReleaseResolver;
pub use metadata::{read_metadata, write_metadata};
pub use release::{Asset, Release};
pub use version::is_newer;
