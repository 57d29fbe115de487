//! Fetch orchestration
//!
//! Turns a query into cache hits plus remote fetches for the gaps, records
//! what was fetched, and merges everything into one ordered row set.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::cache::entry::Payload;
use crate::cache::error::CacheResult;
use crate::cache::index::{Lookup, SeriesCache};
use crate::cache::range::TimeRange;
use crate::remote::{RemoteSource, SeriesCatalog};
use crate::storage::{sort_dedup_trim, PayloadStore, Row};

/// Fetch behaviour
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Gap fetches allowed in flight for a single query (1 = sequential)
    pub max_concurrent_fetches: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 1,
        }
    }
}

/// Rows of one cached or fetched window, keyed by where the window starts
type Chunk = (DateTime<Utc>, Vec<Row>);

/// Resolves queries against the cache and the remote source
pub struct FetchOrchestrator {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn PayloadStore>,
    cache: Arc<SeriesCache>,
    catalog: Option<Arc<dyn SeriesCatalog>>,
    config: FetchConfig,
    shutdown: AtomicBool,
}

impl FetchOrchestrator {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn PayloadStore>,
        cache: Arc<SeriesCache>,
        config: FetchConfig,
    ) -> Self {
        Self {
            remote,
            store,
            cache,
            catalog: None,
            config,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Clip fetches to the bounds a catalog reports for each series
    pub fn with_catalog(mut self, catalog: Arc<dyn SeriesCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn cache(&self) -> &Arc<SeriesCache> {
        &self.cache
    }

    /// All rows of `series_id` within `[start, stop]`, sorted by timestamp
    ///
    /// Only the parts of the window not already cached are fetched. Any
    /// remote or storage failure fails the whole call; windows fetched
    /// before the failure stay recorded.
    pub async fn resolve(
        &self,
        series_id: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> CacheResult<Vec<Row>> {
        let query = TimeRange::new(start, stop)?;
        let lookup = self.cache.lookup(series_id, &query)?;

        tracing::debug!(
            "Resolve {} {}: {} hit(s), {} gap(s)",
            series_id,
            query,
            lookup.hits.len(),
            lookup.gaps.len()
        );

        let mut chunks: Vec<Chunk> = Vec::with_capacity(lookup.hits.len() + lookup.gaps.len());
        for hit in &lookup.hits {
            if let Payload::Stored(payload) = &hit.payload {
                chunks.push((hit.range.start(), self.store.load(payload).await?));
            }
        }

        let fetched: Vec<Chunk> = stream::iter(lookup.gaps.iter().copied())
            .map(|gap| self.fill_gap(series_id, gap))
            .buffered(self.config.max_concurrent_fetches.max(1))
            .try_collect()
            .await?;
        chunks.extend(fetched);

        // Earlier windows win timestamp ties
        chunks.sort_by_key(|(window_start, _)| *window_start);
        let rows = chunks.into_iter().flat_map(|(_, rows)| rows).collect();

        Ok(sort_dedup_trim(rows, query.start(), query.stop()))
    }

    /// Hits and gaps for a query, without fetching anything
    pub fn plan(
        &self,
        series_id: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> CacheResult<Lookup> {
        let query = TimeRange::new(start, stop)?;
        self.cache.lookup(series_id, &query)
    }

    /// Fetch one gap, persist it and record it
    ///
    /// The recorded entry always spans the whole gap, even when the fetch
    /// window was narrowed to the catalog bounds.
    async fn fill_gap(&self, series_id: &str, gap: TimeRange) -> CacheResult<Chunk> {
        let window = match &self.catalog {
            Some(catalog) => match catalog.series_bounds(series_id) {
                Some(bounds) => gap.intersection(&bounds),
                None => Some(gap),
            },
            None => Some(gap),
        };

        let Some(window) = window else {
            tracing::debug!("Gap {} of {} is outside the series bounds", gap, series_id);
            self.cache.record(series_id, gap, Payload::Empty)?;
            return Ok((gap.start(), Vec::new()));
        };

        tracing::debug!("Fetching {} {}", series_id, window);
        let rows = self.remote.fetch(series_id, &window).await?;

        if rows.is_empty() {
            self.cache.record(series_id, gap, Payload::Empty)?;
        } else {
            let payload = self.store.store(series_id, &gap, &rows).await?;
            self.cache.record(series_id, gap, Payload::Stored(payload))?;
        }
        Ok((gap.start(), rows))
    }

    /// Periodically save the index while it has unsaved entries
    ///
    /// Stops after `shutdown`. Does not replace the final save in `shutdown`.
    /// A zero period is raised to one second.
    pub fn start_background_save(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let every = if every.is_zero() {
            tracing::warn!("Background save period is zero, using 1s");
            Duration::from_secs(1)
        } else {
            every
        };

        tokio::spawn(async move {
            let mut ticker = interval(every);

            loop {
                ticker.tick().await;

                if orchestrator.shutdown.load(Ordering::SeqCst) {
                    break;
                }

                if let Err(e) = orchestrator.cache.save_if_dirty() {
                    tracing::error!("Background index save failed: {}", e);
                }
            }
        })
    }

    /// Persist the index; call before the process exits
    pub async fn shutdown(&self) -> CacheResult<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.cache.save()?;
        tracing::info!("Cache shutdown complete");
        Ok(())
    }
}
