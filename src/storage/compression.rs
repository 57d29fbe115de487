//! Row block encoding for cached payloads
//!
//! Implements delta encoding + LZ4 compression for fetched row sets.
//!
//! Strategy:
//! 1. Keep rows in the order the remote source returned them
//! 2. Delta-encode timestamps in microseconds (store differences)
//! 3. Flatten values row-major with a fixed column width
//! 4. Serialize to compact binary format
//! 5. LZ4 compress the result
//!
//! Remote rows are usually evenly sampled, so the deltas are near-constant
//! and compress very well.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::cache::error::{CacheError, CacheResult};
use crate::storage::types::Row;

/// Intermediate format for delta-encoded rows
#[derive(Debug, Serialize, Deserialize)]
struct EncodedRows {
    /// First row's timestamp, microseconds since the epoch
    base_micros: i64,
    /// Timestamp differences from the previous row
    deltas: Vec<i64>,
    /// Values per row
    width: u32,
    /// All values, row-major
    values: Vec<f64>,
}

/// Encode rows using delta encoding + LZ4
///
/// All rows must have the same number of values.
pub fn encode_rows(rows: &[Row]) -> CacheResult<Vec<u8>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let width = rows[0].width();
    if let Some(bad) = rows.iter().find(|r| r.width() != width) {
        return Err(CacheError::Serialization(format!(
            "Row at {} has {} values, expected {}",
            bad.timestamp,
            bad.width(),
            width
        )));
    }

    let base_micros = rows[0].timestamp.timestamp_micros();
    let mut deltas = Vec::with_capacity(rows.len());
    let mut prev = base_micros;
    for row in rows {
        let micros = row.timestamp.timestamp_micros();
        deltas.push(micros - prev);
        prev = micros;
    }

    let mut values = Vec::with_capacity(rows.len() * width);
    for row in rows {
        values.extend_from_slice(&row.values);
    }

    let block = EncodedRows {
        base_micros,
        deltas,
        width: width as u32,
        values,
    };

    // Serialize with bincode (compact binary format)
    let serialized = bincode::serialize(&block)?;

    Ok(lz4_flex::compress_prepend_size(&serialized))
}

/// Decode rows produced by `encode_rows`
pub fn decode_rows(data: &[u8]) -> CacheResult<Vec<Row>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| CacheError::Compression(format!("LZ4 decompression failed: {}", e)))?;

    let block: EncodedRows = bincode::deserialize(&decompressed)?;

    let width = block.width as usize;
    if block.values.len() != block.deltas.len() * width {
        return Err(CacheError::Corruption(format!(
            "Row block holds {} values for {} rows of width {}",
            block.values.len(),
            block.deltas.len(),
            width
        )));
    }

    let mut rows = Vec::with_capacity(block.deltas.len());
    let mut micros = block.base_micros;
    for (i, delta) in block.deltas.iter().enumerate() {
        micros += delta;
        let timestamp = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
            CacheError::Corruption(format!("Timestamp out of range: {} us", micros))
        })?;
        let values = block.values[i * width..(i + 1) * width].to_vec();
        rows.push(Row { timestamp, values });
    }

    Ok(rows)
}
