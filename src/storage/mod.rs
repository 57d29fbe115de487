//! Payload storage
//!
//! Persists the rows of each fetched window and reads them back:
//!
//! - **types**: `Row`, the sample type, and result trimming
//! - **compression**: Delta encoding + LZ4 for row blocks
//! - **blob**: Checksummed blob files and the `BlobStore`
//!
//! # Architecture
//!
//! ```text
//! Store:
//!   Rows → Delta encode → LZ4 → Header + CRC → tmp file → rename → PayloadRef
//!
//! Load:
//!   PayloadRef → Blob file → Verify CRC → Decompress → Rows
//! ```

pub mod blob;
pub mod compression;
pub mod types;

pub use blob::{decode_blob, encode_blob, BlobHeader, BlobStore};
pub use compression::{decode_rows, encode_rows};
pub use types::{sort_dedup_trim, Row};

use async_trait::async_trait;

use crate::cache::entry::PayloadRef;
use crate::cache::error::CacheResult;
use crate::cache::range::TimeRange;

/// Where fetched rows are kept between queries
///
/// Content-stable: a ref returned by `store` always loads the same rows.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Persist one window's rows, returning a handle to them
    async fn store(&self, series_id: &str, range: &TimeRange, rows: &[Row]) -> CacheResult<PayloadRef>;

    /// Load rows previously persisted by `store`
    async fn load(&self, payload: &PayloadRef) -> CacheResult<Vec<Row>>;
}
