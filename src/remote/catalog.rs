//! Configured series catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cache::error::CacheResult;
use crate::cache::range::TimeRange;
use crate::remote::SeriesCatalog;

/// One `[[catalog]]` entry: a series and the span it has data for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

/// Catalog backed by a fixed map of series bounds
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    bounds: HashMap<String, TimeRange>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured entries, rejecting reversed bounds
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CatalogEntry>) -> CacheResult<Self> {
        let mut catalog = Self::new();
        for entry in entries {
            catalog.insert(&entry.id, TimeRange::new(entry.start, entry.stop)?);
        }
        Ok(catalog)
    }

    /// Set (or replace) the bounds of a series
    pub fn insert(&mut self, series_id: impl Into<String>, bounds: TimeRange) {
        self.bounds.insert(series_id.into(), bounds);
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

impl SeriesCatalog for StaticCatalog {
    fn series_bounds(&self, series_id: &str) -> Option<TimeRange> {
        self.bounds.get(series_id).copied()
    }
}
