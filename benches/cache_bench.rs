//! Benchmarks for the seriescache hot paths
//!
//! Run with: cargo bench

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use seriescache::cache::{subtract_all, Payload, SeriesCache, TimeRange};
use seriescache::storage::{decode_rows, encode_rows, BlobStore, PayloadStore, Row};
use tempfile::tempdir;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2006, 1, 1, 0, 0, 0).unwrap()
}

fn create_test_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            Row::new(
                base() + Duration::seconds(i as i64 * 4),
                vec![i as f64, (i as f64).sin(), 0.5],
            )
        })
        .collect()
}

/// One hour of coverage at the start of each day
fn daily_covers(days: i64) -> Vec<TimeRange> {
    (0..days)
        .map(|d| {
            let start = base() + Duration::days(d);
            TimeRange::new(start, start + Duration::hours(1)).unwrap()
        })
        .collect()
}

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");

    for size in [100, 1000, 10000] {
        let rows = create_test_rows(size);

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("encode_{}", size), |b| {
            b.iter(|| encode_rows(black_box(&rows)).unwrap())
        });

        let encoded = encode_rows(&rows).unwrap();

        group.bench_function(format!("decode_{}", size), |b| {
            b.iter(|| decode_rows(black_box(&encoded)).unwrap())
        });
    }

    group.finish();
}

fn bench_gaps(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaps");

    for days in [10, 365, 3650] {
        let covers = daily_covers(days);
        let query = TimeRange::new(base(), base() + Duration::days(days)).unwrap();

        group.bench_function(format!("subtract_all_{}", days), |b| {
            b.iter(|| subtract_all(black_box(&query), black_box(&covers)))
        });
    }

    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    let dir = tempdir().unwrap();
    let cache = SeriesCache::open(dir.path().join("index.json")).unwrap();
    for cover in daily_covers(3650) {
        cache.record("c1_b_gsm", cover, Payload::Empty).unwrap();
    }

    let query = TimeRange::new(
        base() + Duration::days(1800),
        base() + Duration::days(1830),
    )
    .unwrap();

    group.bench_function("lookup_month_of_3650", |b| {
        b.iter(|| cache.lookup("c1_b_gsm", black_box(&query)).unwrap())
    });

    group.bench_function("save_3650", |b| b.iter(|| cache.save().unwrap()));

    group.finish();
}

fn bench_blob_store(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("blob_store");

    group.bench_function("store_900", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let dir = tempdir().unwrap();
                let store = BlobStore::new(dir.path()).unwrap();
                let rows = create_test_rows(900);
                let range = TimeRange::new(rows[0].timestamp, rows[899].timestamp).unwrap();

                let start = std::time::Instant::now();

                for _ in 0..iters {
                    store.store("c1_b_gsm", &range, &rows).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.bench_function("load_900", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let dir = tempdir().unwrap();
                let store = BlobStore::new(dir.path()).unwrap();
                let rows = create_test_rows(900);
                let range = TimeRange::new(rows[0].timestamp, rows[899].timestamp).unwrap();
                let payload = store.store("c1_b_gsm", &range, &rows).await.unwrap();

                let start = std::time::Instant::now();

                for _ in 0..iters {
                    let _ = store.load(black_box(&payload)).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_compression, bench_gaps, bench_index, bench_blob_store);
criterion_main!(benches);
