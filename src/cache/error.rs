//! Cache engine error types
//!
//! Defines all errors that can occur while resolving, storing or persisting
//! cached time-series windows.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use crate::remote::RemoteError;

/// Errors that can occur in the cache engine
#[derive(Error, Debug)]
pub enum CacheError {
    /// Range or query with start after stop
    #[error("Invalid time range: start {start} is after stop {stop}")]
    InvalidRange {
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    },

    /// Remote source could not be reached (connect failure, timeout, throttling)
    #[error("Remote source unavailable: {0}")]
    RemoteUnavailable(String),

    /// Remote source answered with an error or an unreadable payload
    #[error("Remote source error: {0}")]
    RemoteError(String),

    /// Local payload persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persisted index could not be parsed at startup
    #[error("Corrupt cache index {path:?}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Stored payload failed validation (checksum mismatch, invalid magic, bad ref)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl CacheError {
    /// Whether the failure came from the remote collaborator
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            CacheError::RemoteUnavailable(_) | CacheError::RemoteError(_)
        )
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<RemoteError> for CacheError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unavailable | RemoteError::Timeout | RemoteError::RateLimited => {
                CacheError::RemoteUnavailable(err.to_string())
            }
            other => CacheError::RemoteError(other.to_string()),
        }
    }
}

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_error_display() {
        let start = Utc.with_ymd_and_hms(2006, 1, 8, 2, 0, 0).unwrap();
        let stop = Utc.with_ymd_and_hms(2006, 1, 8, 1, 0, 0).unwrap();
        let err = CacheError::InvalidRange { start, stop };
        assert_eq!(
            err.to_string(),
            "Invalid time range: start 2006-01-08 02:00:00 UTC is after stop 2006-01-08 01:00:00 UTC"
        );

        let err = CacheError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cache_err: CacheError = io_err.into();
        assert!(matches!(cache_err, CacheError::Io(_)));
    }

    #[test]
    fn test_remote_error_mapping() {
        let err: CacheError = RemoteError::Timeout.into();
        assert!(matches!(err, CacheError::RemoteUnavailable(_)));
        assert!(err.is_remote());

        let err: CacheError = RemoteError::Unavailable.into();
        assert!(matches!(err, CacheError::RemoteUnavailable(_)));

        // Still throttled after the last retry
        let err: CacheError = RemoteError::RateLimited.into();
        assert!(matches!(err, CacheError::RemoteUnavailable(_)));

        let err: CacheError = RemoteError::Protocol("bad line".to_string()).into();
        assert!(matches!(err, CacheError::RemoteError(_)));
        assert!(!CacheError::Storage("x".to_string()).is_remote());
    }
}
