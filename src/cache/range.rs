//! Closed time intervals and gap arithmetic
//!
//! `TimeRange` is a closed `[start, stop]` span of UTC instants. Besides the
//! usual intersection/containment tests it supports set difference, which is
//! what the cache uses to work out which sub-windows of a query still have
//! to be fetched from the remote source.
//!
//! ```text
//! query:   [================================]
//! covers:      [====]      [=======]
//! gaps:    [===]    [======]       [========]
//! ```

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::fmt;
use std::ops::{Add, Sub};

use crate::cache::error::{CacheError, CacheResult};

/// Closed time interval `[start, stop]`
///
/// Always satisfies `start <= stop`; the only constructor checks it.
/// Ordering is by `start`, then `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeRange {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
}

impl TimeRange {
    /// Create a new range, rejecting `start > stop`
    ///
    /// Bounds are never swapped.
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>) -> CacheResult<Self> {
        if start > stop {
            return Err(CacheError::InvalidRange { start, stop });
        }
        Ok(Self { start, stop })
    }

    /// Start instant (inclusive)
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Stop instant (inclusive)
    pub fn stop(&self) -> DateTime<Utc> {
        self.stop
    }

    /// Length of the interval
    pub fn duration(&self) -> Duration {
        self.stop - self.start
    }

    /// True iff the two closed intervals share at least one instant
    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.stop >= other.start && self.start <= other.stop
    }

    /// Check if an instant falls within this range
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.stop
    }

    /// True iff either `a` or `b` falls within this range
    ///
    /// Fails with `InvalidRange` when `a > b`.
    pub fn contains_point_pair(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> CacheResult<bool> {
        if a > b {
            return Err(CacheError::InvalidRange { start: a, stop: b });
        }
        Ok(self.contains(a) || self.contains(b))
    }

    /// Translate both bounds by `delta`
    pub fn shift(&self, delta: Duration) -> Self {
        Self {
            start: self.start + delta,
            stop: self.stop + delta,
        }
    }

    /// Overlapping part of two ranges, if any
    pub fn intersection(&self, other: &TimeRange) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self {
            start: self.start.max(other.start),
            stop: self.stop.min(other.stop),
        })
    }

    /// Remove a single range from this one
    ///
    /// Yields zero, one or two remainders. A non-intersecting `other` leaves
    /// `self` unchanged.
    pub fn subtract(&self, other: &TimeRange) -> Vec<TimeRange> {
        if !self.intersects(other) {
            return vec![*self];
        }

        let mut remainders = Vec::with_capacity(2);
        if self.start < other.start {
            remainders.push(Self {
                start: self.start,
                stop: other.start,
            });
        }
        if self.stop > other.stop {
            remainders.push(Self {
                start: other.stop,
                stop: self.stop,
            });
        }
        remainders
    }

    /// Remove every range of `covers` from this one
    ///
    /// See [`subtract_all`].
    pub fn subtract_all(&self, covers: &[TimeRange]) -> Vec<TimeRange> {
        subtract_all(self, covers)
    }
}

/// Gaps of `query` that no range in `covers` reaches, in chronological order
///
/// Covers may be unsorted, overlapping or nested; ones not intersecting the
/// query are ignored. Sweeps a cursor over the covers sorted by start:
/// everything between the cursor and the next cover start is a gap, and the
/// cursor then jumps to the furthest stop seen so far. Touching covers leave
/// no zero-width gap between them.
pub fn subtract_all(query: &TimeRange, covers: &[TimeRange]) -> Vec<TimeRange> {
    let mut sorted: Vec<&TimeRange> = covers.iter().filter(|c| query.intersects(c)).collect();
    if sorted.is_empty() {
        return vec![*query];
    }
    sorted.sort();

    let mut gaps = Vec::new();
    let mut cursor = query.start;

    for cover in sorted {
        if cover.start > cursor {
            gaps.push(TimeRange {
                start: cursor,
                stop: cover.start,
            });
        }
        cursor = cursor.max(cover.stop);
    }

    if query.stop > cursor {
        gaps.push(TimeRange {
            start: cursor,
            stop: query.stop,
        });
    }

    gaps
}

impl Add<Duration> for TimeRange {
    type Output = TimeRange;

    fn add(self, delta: Duration) -> TimeRange {
        self.shift(delta)
    }
}

impl Sub<Duration> for TimeRange {
    type Output = TimeRange;

    fn sub(self, delta: Duration) -> TimeRange {
        self.shift(-delta)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{}",
            self.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.stop.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}
