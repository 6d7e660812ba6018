//! NSFW Model Manager - offline-first model acquisition
//!
//! Resolves, downloads and caches the NSFW SavedModel release so an
//! inference runtime can load it from a local directory.

pub mod config;
pub mod error;
pub mod models;
pub mod resolver;

pub use config::{FallbackRelease, ResolverConfig};
pub use error::{ModelError, ModelResult};
pub use models::{Asset, CachedEntry, Release};
pub use resolver::{ModelPath, ModelPathResolver};
