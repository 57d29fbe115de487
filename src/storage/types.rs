//! Row type shared by the remote source, the payload store and the cache
//!
//! A `Row` is one sample of a series: a timestamp plus the value of every
//! component (e.g. the three axes of a magnetic field vector).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single time-series sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Sample time
    pub timestamp: DateTime<Utc>,
    /// Component values, in column order
    pub values: Vec<f64>,
}

impl Row {
    pub fn new(timestamp: DateTime<Utc>, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }

    /// Number of value columns
    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Sort rows by timestamp, drop repeated timestamps, and keep `[start, stop]`
///
/// The sort is stable, so among rows sharing a timestamp the one that came
/// first in `rows` is kept.
pub fn sort_dedup_trim(
    mut rows: Vec<Row>,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
) -> Vec<Row> {
    rows.retain(|r| start <= r.timestamp && r.timestamp <= stop);
    rows.sort_by_key(|r| r.timestamp);
    rows.dedup_by_key(|r| r.timestamp);
    rows
}
