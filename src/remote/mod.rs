//! Remote data sources
//!
//! The cache only ever talks to the slow upstream through these traits:
//! - `RemoteSource` fetches the rows of one window
//! - `SeriesCatalog` answers which time span a series covers at all
//!
//! `RestSource` is the HTTP client for AMDA-style servers, `StaticCatalog`
//! a catalog built from configuration.

mod catalog;
mod rest;

pub use catalog::{CatalogEntry, StaticCatalog};
pub use rest::{parse_ascii_rows, RestConfig, RestSource};

use async_trait::async_trait;

use crate::cache::range::TimeRange;
use crate::storage::Row;

/// Upstream time-series service
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch every row of `series_id` inside `range`
    ///
    /// An empty vector means the source has no data there, which is a
    /// valid answer and not an error.
    async fn fetch(&self, series_id: &str, range: &TimeRange) -> Result<Vec<Row>, RemoteError>;
}

/// Global availability of each series
pub trait SeriesCatalog: Send + Sync {
    /// Span over which `series_id` has data, if known
    fn series_bounds(&self, series_id: &str) -> Option<TimeRange>;
}

/// Errors that can occur when talking to a remote source
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote source unavailable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited")]
    RateLimited,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Classify a transport error the way the retry loop expects
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_connect() {
            RemoteError::Unavailable
        } else {
            RemoteError::Request(err)
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Unavailable | RemoteError::Timeout | RemoteError::RateLimited
        )
    }
}
