//! Series cache index
//!
//! Maps every series to the list of windows already fetched for it, kept
//! sorted by window start. The whole index lives in memory and is mirrored
//! to a single JSON file:
//!
//! ```text
//! {
//!   "version": 1,
//!   "series": {
//!     "c1_b_gsm": [
//!       { "start": "2006-01-08T00:00:00Z", "stop": "2006-01-08T01:00:00Z", "payload": "9b2e..." },
//!       { "start": "2006-01-09T00:00:00Z", "stop": "2006-01-09T01:00:00Z", "payload": null }
//!     ]
//!   }
//! }
//! ```
//!
//! The file is read once in [`SeriesCache::open`] and written only by
//! [`SeriesCache::save`]. Entries recorded after the last save are lost on
//! an unclean shutdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::entry::{CacheEntry, Payload, PayloadRef};
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::range::TimeRange;

/// Current index file format version
const INDEX_VERSION: u32 = 1;

/// On-disk shape of the index
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    #[serde(default)]
    series: BTreeMap<String, Vec<IndexRecord>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    /// `null` marks a window confirmed empty
    payload: Option<PayloadRef>,
}

impl From<&CacheEntry> for IndexRecord {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            start: entry.range.start(),
            stop: entry.range.stop(),
            payload: entry.payload.stored_ref().cloned(),
        }
    }
}

/// Cached entries intersecting a query plus the sub-ranges still missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
    /// Entries intersecting the query, sorted by start
    pub hits: Vec<CacheEntry>,
    /// Parts of the query no entry covers, in chronological order
    pub gaps: Vec<TimeRange>,
}

impl Lookup {
    /// Nothing left to fetch
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Per-series sorted entry store backed by a JSON index file
pub struct SeriesCache {
    /// Index file location
    path: PathBuf,
    /// Series id to entries sorted by range start
    series: RwLock<HashMap<String, Vec<CacheEntry>>>,
    /// Serializes writers of the index file
    save_lock: Mutex<()>,
    /// Set by `record`, cleared by a successful `save`
    dirty: AtomicBool,
}

impl SeriesCache {
    /// Open the index at `path`
    ///
    /// A missing file yields an empty cache. A file that exists but cannot be
    /// parsed fails with `CorruptIndex`; it is never silently discarded.
    pub fn open(path: impl Into<PathBuf>) -> CacheResult<Self> {
        let path = path.into();
        let series = if path.exists() {
            Self::load(&path)?
        } else {
            tracing::info!("No cache index at {:?}, starting empty", path);
            HashMap::new()
        };

        Ok(Self {
            path,
            series: RwLock::new(series),
            save_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
        })
    }

    fn load(path: &Path) -> CacheResult<HashMap<String, Vec<CacheEntry>>> {
        let content = std::fs::read_to_string(path)?;
        let corrupt = |reason: String| CacheError::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };

        let file: IndexFile = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        if file.version > INDEX_VERSION {
            return Err(corrupt(format!("unsupported version {}", file.version)));
        }

        let mut series = HashMap::with_capacity(file.series.len());
        let mut entry_count = 0usize;
        for (series_id, records) in file.series {
            let mut entries = Vec::with_capacity(records.len());
            for record in records {
                let range = TimeRange::new(record.start, record.stop)
                    .map_err(|e| corrupt(format!("series {}: {}", series_id, e)))?;
                entries.push(CacheEntry::new(range, Payload::from(record.payload)));
            }
            entries.sort_by_key(|e| e.range);
            entry_count += entries.len();
            series.insert(series_id, entries);
        }

        tracing::info!(
            "Loaded cache index {:?}: {} series, {} entries",
            path,
            series.len(),
            entry_count
        );
        Ok(series)
    }

    fn read(&self) -> CacheResult<RwLockReadGuard<'_, HashMap<String, Vec<CacheEntry>>>> {
        self.series
            .read()
            .map_err(|e| CacheError::Lock(format!("Failed to acquire index read lock: {}", e)))
    }

    fn write(&self) -> CacheResult<RwLockWriteGuard<'_, HashMap<String, Vec<CacheEntry>>>> {
        self.series
            .write()
            .map_err(|e| CacheError::Lock(format!("Failed to acquire index write lock: {}", e)))
    }

    /// Index file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the series has any entry at all
    pub fn contains_series(&self, series_id: &str) -> CacheResult<bool> {
        Ok(self.read()?.contains_key(series_id))
    }

    /// Entries whose range intersects `range`, sorted by start
    pub fn entries_overlapping(
        &self,
        series_id: &str,
        range: &TimeRange,
    ) -> CacheResult<Vec<CacheEntry>> {
        let series = self.read()?;
        Ok(series
            .get(series_id)
            .map(|entries| overlapping(entries, range))
            .unwrap_or_default())
    }

    /// Sub-ranges of `range` no entry covers
    ///
    /// An unknown series is a full miss: `[range]`.
    pub fn missing_ranges(&self, series_id: &str, range: &TimeRange) -> CacheResult<Vec<TimeRange>> {
        Ok(self.lookup(series_id, range)?.gaps)
    }

    /// Hits and gaps for `range`, computed from one snapshot of the series
    pub fn lookup(&self, series_id: &str, range: &TimeRange) -> CacheResult<Lookup> {
        let series = self.read()?;
        let Some(entries) = series.get(series_id) else {
            return Ok(Lookup {
                hits: Vec::new(),
                gaps: vec![*range],
            });
        };

        let hits = overlapping(entries, range);
        let covers: Vec<TimeRange> = hits.iter().map(|e| e.range).collect();
        let gaps = range.subtract_all(&covers);
        Ok(Lookup { hits, gaps })
    }

    /// Append a new entry
    ///
    /// Never merges with or replaces existing entries, so overlapping coverage
    /// from concurrent fetches is kept as is.
    pub fn record(&self, series_id: &str, range: TimeRange, payload: Payload) -> CacheResult<()> {
        {
            let mut series = self.write()?;
            let entries = series.entry(series_id.to_string()).or_default();
            let idx = entries.partition_point(|e| e.range <= range);
            entries.insert(idx, CacheEntry::new(range, payload));
        }
        self.dirty.store(true, Ordering::SeqCst);
        tracing::debug!("Recorded entry {} for {}", range, series_id);
        Ok(())
    }

    /// True if entries were recorded since the last successful save
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Write the whole index to disk
    ///
    /// Writes a sibling temp file, syncs it, then renames it over the index,
    /// so readers never see a half-written file. One writer at a time.
    pub fn save(&self) -> CacheResult<()> {
        let _guard = self
            .save_lock
            .lock()
            .map_err(|e| CacheError::Lock(format!("Failed to acquire save lock: {}", e)))?;

        // Cleared before the snapshot: a record racing with this save re-marks it
        self.dirty.store(false, Ordering::SeqCst);

        let (file, series_count, entry_count) = {
            let series = self.read()?;
            let file = IndexFile {
                version: INDEX_VERSION,
                series: series
                    .iter()
                    .map(|(id, entries)| {
                        (id.clone(), entries.iter().map(IndexRecord::from).collect::<Vec<_>>())
                    })
                    .collect(),
            };
            let entry_count = series.values().map(Vec::len).sum::<usize>();
            (file, series.len(), entry_count)
        };

        let result = serde_json::to_string_pretty(&file)
            .map_err(CacheError::from)
            .and_then(|content| self.write_atomic(content.as_bytes()));

        if let Err(e) = result {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }

        tracing::info!(
            "Saved cache index {:?}: {} series, {} entries",
            self.path,
            series_count,
            entry_count
        );
        Ok(())
    }

    /// Save only if something changed since the last save
    pub fn save_if_dirty(&self) -> CacheResult<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn write_atomic(&self, content: &[u8]) -> CacheResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = temp_path(&self.path);
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(content)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Known series ids, sorted
    pub fn series_ids(&self) -> CacheResult<Vec<String>> {
        let mut ids: Vec<String> = self.read()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Index statistics
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let series = self.read()?;
        let entry_count = series.values().map(Vec::len).sum();
        let empty_entries = series
            .values()
            .flatten()
            .filter(|e| e.payload.is_empty())
            .count();

        Ok(CacheStats {
            series_count: series.len(),
            entry_count,
            empty_entries,
            dirty: self.is_dirty(),
        })
    }
}

fn overlapping(entries: &[CacheEntry], range: &TimeRange) -> Vec<CacheEntry> {
    // Sorted by start: nothing past the query stop can intersect
    let end = entries.partition_point(|e| e.range.start() <= range.stop());
    entries[..end]
        .iter()
        .filter(|e| e.range.intersects(range))
        .cloned()
        .collect()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Cache index statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub series_count: usize,
    pub entry_count: usize,
    pub empty_entries: usize,
    pub dirty: bool,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Series: {}, Entries: {} ({} empty), Unsaved changes: {}",
            self.series_count,
            self.entry_count,
            self.empty_entries,
            if self.dirty { "yes" } else { "no" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, hh, mm, 0).unwrap()
    }

    fn range(a: DateTime<Utc>, b: DateTime<Utc>) -> TimeRange {
        TimeRange::new(a, b).unwrap()
    }

    /// Ten daily one-hour entries for "product1" starting 2006-01-08
    fn create_test_cache() -> (SeriesCache, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let cache = SeriesCache::open(dir.path().join("index.json")).unwrap();

        let mut r = range(at(2006, 1, 8, 0, 0), at(2006, 1, 8, 1, 0));
        for _ in 0..10 {
            cache.record("product1", r, Payload::Empty).unwrap();
            r = r + Duration::days(1);
        }
        (cache, dir)
    }

    #[test]
    fn test_missing_ranges() {
        let (cache, _dir) = create_test_cache();

        let cases = [
            (
                "product1",
                range(at(2006, 1, 8, 0, 20), at(2006, 1, 8, 0, 40)),
                vec![],
            ),
            (
                "product not in cache",
                range(at(2006, 1, 8, 0, 20), at(2006, 1, 8, 0, 40)),
                vec![range(at(2006, 1, 8, 0, 20), at(2006, 1, 8, 0, 40))],
            ),
            (
                "product1",
                range(at(2016, 1, 8, 0, 20), at(2016, 1, 8, 0, 40)),
                vec![range(at(2016, 1, 8, 0, 20), at(2016, 1, 8, 0, 40))],
            ),
            (
                "product1",
                range(at(2006, 1, 8, 0, 20), at(2006, 1, 8, 1, 40)),
                vec![range(at(2006, 1, 8, 1, 0), at(2006, 1, 8, 1, 40))],
            ),
            (
                "product1",
                range(at(2006, 1, 7, 23, 20), at(2006, 1, 8, 1, 0)),
                vec![range(at(2006, 1, 7, 23, 20), at(2006, 1, 8, 0, 0))],
            ),
            (
                "product1",
                range(at(2006, 1, 7, 23, 20), at(2006, 1, 8, 1, 40)),
                vec![
                    range(at(2006, 1, 7, 23, 20), at(2006, 1, 8, 0, 0)),
                    range(at(2006, 1, 8, 1, 0), at(2006, 1, 8, 1, 40)),
                ],
            ),
            (
                "product1",
                range(at(2006, 1, 8, 0, 0), at(2006, 1, 9, 1, 40)),
                vec![
                    range(at(2006, 1, 8, 1, 0), at(2006, 1, 9, 0, 0)),
                    range(at(2006, 1, 9, 1, 0), at(2006, 1, 9, 1, 40)),
                ],
            ),
        ];

        for (series, query, expected) in cases {
            assert_eq!(
                cache.missing_ranges(series, &query).unwrap(),
                expected,
                "{} {}",
                series,
                query
            );
        }
    }

    #[test]
    fn test_entries_overlapping() {
        let (cache, _dir) = create_test_cache();

        let query = range(at(2006, 1, 8, 0, 20), at(2006, 1, 10, 0, 10));
        let hits = cache.entries_overlapping("product1", &query).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].range.start(), at(2006, 1, 8, 0, 0));
        assert_eq!(hits[2].range.start(), at(2006, 1, 10, 0, 0));

        assert!(cache
            .entries_overlapping("unknown", &query)
            .unwrap()
            .is_empty());

        let far = range(at(2030, 1, 1, 0, 0), at(2030, 1, 2, 0, 0));
        assert!(cache.entries_overlapping("product1", &far).unwrap().is_empty());
    }

    #[test]
    fn test_record_keeps_entries_sorted() {
        let dir = tempdir().unwrap();
        let cache = SeriesCache::open(dir.path().join("index.json")).unwrap();

        let late = range(at(2006, 1, 9, 0, 0), at(2006, 1, 9, 1, 0));
        let early = range(at(2006, 1, 8, 0, 0), at(2006, 1, 8, 1, 0));
        cache.record("p1", late, Payload::Empty).unwrap();
        cache.record("p1", early, Payload::Empty).unwrap();
        // Duplicate coverage is kept, not merged
        cache.record("p1", early, Payload::Empty).unwrap();

        let all = range(at(2006, 1, 1, 0, 0), at(2006, 2, 1, 0, 0));
        let hits = cache.entries_overlapping("p1", &all).unwrap();
        let starts: Vec<_> = hits.iter().map(|e| e.range).collect();
        assert_eq!(starts, vec![early, early, late]);
    }

    #[test]
    fn test_save_and_reopen() {
        let (cache, dir) = create_test_cache();
        let stored = range(at(2007, 3, 1, 0, 0), at(2007, 3, 1, 6, 0));
        cache
            .record("c1_b_gsm", stored, Payload::Stored(PayloadRef::new("abc")))
            .unwrap();
        assert!(cache.is_dirty());

        cache.save().unwrap();
        assert!(!cache.is_dirty());
        assert!(!dir.path().join("index.json.tmp").exists());

        let reopened = SeriesCache::open(dir.path().join("index.json")).unwrap();
        assert_eq!(
            reopened.series_ids().unwrap(),
            vec!["c1_b_gsm".to_string(), "product1".to_string()]
        );

        let hits = reopened.entries_overlapping("c1_b_gsm", &stored).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload, Payload::Stored(PayloadRef::new("abc")));

        let stats = reopened.stats().unwrap();
        assert_eq!(stats.series_count, 2);
        assert_eq!(stats.entry_count, 11);
        assert_eq!(stats.empty_entries, 10);
        assert!(!stats.dirty);
    }

    #[test]
    fn test_save_is_idempotent() {
        let (cache, dir) = create_test_cache();
        cache.save().unwrap();
        let first = std::fs::read_to_string(dir.path().join("index.json")).unwrap();
        cache.save().unwrap();
        let second = std::fs::read_to_string(dir.path().join("index.json")).unwrap();
        assert_eq!(first, second);

        assert!(!cache.save_if_dirty().unwrap());
        cache
            .record("product1", range(at(2020, 1, 1, 0, 0), at(2020, 1, 1, 1, 0)), Payload::Empty)
            .unwrap();
        assert!(cache.save_if_dirty().unwrap());
    }

    #[test]
    fn test_corrupt_index_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SeriesCache::open(&path).err().unwrap();
        assert!(matches!(err, CacheError::CorruptIndex { .. }));
    }

    #[test]
    fn test_reversed_record_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(
            &path,
            r#"{"version":1,"series":{"p1":[{"start":"2006-01-08T02:00:00Z","stop":"2006-01-08T01:00:00Z","payload":null}]}}"#,
        )
        .unwrap();

        let err = SeriesCache::open(&path).err().unwrap();
        assert!(matches!(err, CacheError::CorruptIndex { .. }));
    }

    #[test]
    fn test_missing_index_starts_empty() {
        let dir = tempdir().unwrap();
        let cache = SeriesCache::open(dir.path().join("nested").join("index.json")).unwrap();
        assert_eq!(cache.stats().unwrap().entry_count, 0);

        // Save creates parent directories
        cache.save().unwrap();
        assert!(dir.path().join("nested").join("index.json").exists());
    }

    #[test]
    fn test_concurrent_record_and_save() {
        let dir = tempdir().unwrap();
        let cache = SeriesCache::open(dir.path().join("index.json")).unwrap();
        let base = range(at(2006, 1, 1, 0, 0), at(2006, 1, 1, 1, 0));

        std::thread::scope(|s| {
            for t in 0..4i64 {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..25i64 {
                        let r = base + Duration::hours(t * 100 + i);
                        cache.record("p1", r, Payload::Empty).unwrap();
                        if i % 10 == 0 {
                            cache.save().unwrap();
                        }
                    }
                });
            }
        });
        cache.save().unwrap();

        let reopened = SeriesCache::open(dir.path().join("index.json")).unwrap();
        assert_eq!(reopened.stats().unwrap().entry_count, 100);
    }
}
