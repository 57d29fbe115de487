//! Blob files holding one fetched window each
//!
//! Every successful remote fetch becomes one immutable file under
//! `<data_dir>/blobs/`, named by a fresh UUID which doubles as its
//! `PayloadRef`.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (18 bytes)                       │
//! │   magic: [u8; 4] = "SCBL"               │
//! │   version: u16                          │
//! │   row_count: u32                        │
//! │   body_len: u32                         │
//! │   body_checksum: u32 (CRC32 of body)    │
//! ├─────────────────────────────────────────┤
//! │ BODY (body_len bytes)                   │
//! │   encode_rows() output                  │
//! └─────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::cache::entry::PayloadRef;
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::range::TimeRange;
use crate::storage::compression::{decode_rows, encode_rows};
use crate::storage::types::Row;
use crate::storage::PayloadStore;

/// Magic bytes for blob file identification
const BLOB_MAGIC: [u8; 4] = *b"SCBL";

/// Current blob format version
const BLOB_VERSION: u16 = 1;

/// Header size in bytes
const HEADER_SIZE: usize = 18;

/// Blob file extension
const BLOB_EXT: &str = "blk";

/// Blob file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    pub version: u16,
    pub row_count: u32,
    pub body_len: u32,
    pub body_checksum: u32,
}

impl BlobHeader {
    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&BLOB_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..10].copy_from_slice(&self.row_count.to_le_bytes());
        buf[10..14].copy_from_slice(&self.body_len.to_le_bytes());
        buf[14..18].copy_from_slice(&self.body_checksum.to_le_bytes());
        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8]) -> CacheResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CacheError::Corruption(format!(
                "Blob too short: {} bytes",
                buf.len()
            )));
        }

        if buf[0..4] != BLOB_MAGIC {
            return Err(CacheError::Corruption(format!(
                "Invalid blob magic: {:?}",
                &buf[0..4]
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > BLOB_VERSION {
            return Err(CacheError::Corruption(format!(
                "Unsupported blob version: {}",
                version
            )));
        }

        Ok(Self {
            version,
            row_count: u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
            body_len: u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]),
            body_checksum: u32::from_le_bytes([buf[14], buf[15], buf[16], buf[17]]),
        })
    }
}

/// Encode rows into a complete blob (header + body)
pub fn encode_blob(rows: &[Row]) -> CacheResult<Vec<u8>> {
    let body = encode_rows(rows)?;
    let header = BlobHeader {
        version: BLOB_VERSION,
        row_count: rows.len() as u32,
        body_len: body.len() as u32,
        body_checksum: crc32fast::hash(&body),
    };

    let mut blob = Vec::with_capacity(HEADER_SIZE + body.len());
    blob.extend_from_slice(&header.to_bytes());
    blob.extend_from_slice(&body);
    Ok(blob)
}

/// Decode a blob, verifying its checksum and row count
pub fn decode_blob(blob: &[u8]) -> CacheResult<Vec<Row>> {
    let header = BlobHeader::from_bytes(blob)?;
    let body = &blob[HEADER_SIZE..];

    if body.len() != header.body_len as usize {
        return Err(CacheError::Corruption(format!(
            "Blob body is {} bytes, header says {}",
            body.len(),
            header.body_len
        )));
    }

    let computed = crc32fast::hash(body);
    if computed != header.body_checksum {
        return Err(CacheError::Corruption(format!(
            "Blob checksum mismatch: stored={}, computed={}",
            header.body_checksum, computed
        )));
    }

    let rows = decode_rows(body)?;
    if rows.len() != header.row_count as usize {
        return Err(CacheError::Corruption(format!(
            "Blob holds {} rows, header says {}",
            rows.len(),
            header.row_count
        )));
    }
    Ok(rows)
}

/// Payload store keeping one blob file per fetched window
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// File backing a payload ref
    ///
    /// Refs must be UUIDs, so a tampered index cannot point outside the store.
    pub fn blob_path(&self, payload: &PayloadRef) -> CacheResult<PathBuf> {
        let id = Uuid::parse_str(payload.as_str()).map_err(|e| {
            CacheError::Corruption(format!("Invalid payload ref {:?}: {}", payload.as_str(), e))
        })?;
        Ok(self.dir.join(format!("{}.{}", id, BLOB_EXT)))
    }
}

#[async_trait]
impl PayloadStore for BlobStore {
    async fn store(&self, series_id: &str, range: &TimeRange, rows: &[Row]) -> CacheResult<PayloadRef> {
        let blob = encode_blob(rows)?;
        let payload = PayloadRef::new(Uuid::new_v4().to_string());
        let path = self.blob_path(&payload)?;
        let tmp_path = path.with_extension(format!("{}.tmp", BLOB_EXT));

        // Only a fully written, synced blob ever appears under its final name
        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&blob).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CacheError::Storage(format!(
                "Failed to write blob for {} {}: {}",
                series_id, range, e
            )));
        }

        tracing::debug!(
            "Stored {} rows of {} {} as {} ({} bytes)",
            rows.len(),
            series_id,
            range,
            payload,
            blob.len()
        );
        Ok(payload)
    }

    async fn load(&self, payload: &PayloadRef) -> CacheResult<Vec<Row>> {
        let path = self.blob_path(payload)?;
        let blob = tokio::fs::read(&path).await.map_err(|e| {
            CacheError::Storage(format!("Failed to read blob {:?}: {}", path, e))
        })?;
        decode_blob(&blob)
    }
}
