//! Interval cache core
//!
//! - **range**: Closed time ranges and gap computation
//! - **entry**: What a cached window resolves to
//! - **index**: Per-series entries persisted as a JSON index
//! - **orchestrator**: Query resolution over cache, store and remote
//! - **error**: Error types

pub mod entry;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod range;

pub use entry::{CacheEntry, Payload, PayloadRef};
pub use error::{CacheError, CacheResult};
pub use index::{CacheStats, Lookup, SeriesCache};
pub use orchestrator::{FetchConfig, FetchOrchestrator};
pub use range::{subtract_all, TimeRange};
