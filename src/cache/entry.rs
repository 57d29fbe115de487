//! Cache entries
//!
//! A `CacheEntry` records that one window of a series has been fetched and
//! where its rows live, or that the remote source confirmed it empty.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::range::TimeRange;

/// Opaque handle to a stored payload, resolvable by a `PayloadStore`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRef(String);

impl PayloadRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a cached window resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Rows persisted by the payload store
    Stored(PayloadRef),
    /// Remote source had no data in this window
    Empty,
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Stored ref, if any
    pub fn stored_ref(&self) -> Option<&PayloadRef> {
        match self {
            Payload::Stored(r) => Some(r),
            Payload::Empty => None,
        }
    }
}

impl From<Option<PayloadRef>> for Payload {
    fn from(value: Option<PayloadRef>) -> Self {
        value.map(Payload::Stored).unwrap_or(Payload::Empty)
    }
}

/// One fetched window of a series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub range: TimeRange,
    pub payload: Payload,
}

impl CacheEntry {
    pub fn new(range: TimeRange, payload: Payload) -> Self {
        Self { range, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_contains_via_range() {
        let start = Utc.with_ymd_and_hms(2006, 1, 8, 1, 0, 0).unwrap();
        let stop = start + Duration::hours(1);
        let entry = CacheEntry::new(
            TimeRange::new(start, stop).unwrap(),
            Payload::Stored(PayloadRef::new("blob")),
        );

        assert!(entry.range.contains_point_pair(start, stop).unwrap());
        assert!(!entry
            .range
            .contains_point_pair(start + Duration::hours(2), stop + Duration::hours(2))
            .unwrap());
        assert!(entry.range.contains_point_pair(stop, start).is_err());
    }

    #[test]
    fn test_payload_from_option() {
        assert_eq!(Payload::from(None), Payload::Empty);
        let p = Payload::from(Some(PayloadRef::new("abc")));
        assert_eq!(p.stored_ref().map(|r| r.as_str()), Some("abc"));
        assert!(!p.is_empty());
        assert!(Payload::Empty.is_empty());
    }
}
