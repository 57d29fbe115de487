//! # seriescache
//!
//! Local interval cache in front of a slow, rate-limited remote time-series
//! server. Queries ask for `[start, stop]` of a series; only the parts not
//! already cached are fetched, and every answer is the exact requested window.
//!
//! ## Modules
//!
//! - [`cache`]: Range algebra, the persisted series index and query resolution
//! - [`storage`]: Compressed, checksummed payload blobs
//! - [`remote`]: Remote source and catalog traits, AMDA REST client
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seriescache::cache::{FetchConfig, FetchOrchestrator, SeriesCache};
//! use seriescache::remote::{RestConfig, RestSource};
//! use seriescache::storage::BlobStore;
//! use chrono::{DateTime, Utc};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = Arc::new(SeriesCache::open("cache/index.json")?);
//!     let store = Arc::new(BlobStore::new("cache/blobs")?);
//!     let remote = Arc::new(RestSource::new(RestConfig::default())?);
//!     let orchestrator = FetchOrchestrator::new(remote, store, cache, FetchConfig::default());
//!
//!     let start: DateTime<Utc> = "2006-01-08T00:00:00Z".parse()?;
//!     let stop: DateTime<Utc> = "2006-01-08T01:00:00Z".parse()?;
//!     let rows = orchestrator.resolve("c1_b_gsm", start, stop).await?;
//!     println!("{} rows", rows.len());
//!
//!     // Persist the index
//!     orchestrator.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod remote;
pub mod storage;

// Re-export top-level types for convenience
pub use cache::{
    CacheEntry, CacheError, CacheResult, CacheStats, FetchConfig, FetchOrchestrator, Lookup,
    Payload, PayloadRef, SeriesCache, TimeRange,
};

pub use storage::{BlobStore, PayloadStore, Row};

pub use remote::{
    parse_ascii_rows, CatalogEntry, RemoteError, RemoteSource, RestConfig, RestSource,
    SeriesCatalog, StaticCatalog,
};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig};
