use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use livecol::storage::BackendConfig;
use livecol::{
    Collection, CompareOp, KeyRange, Revision, Store, StoreConfig, VersionRange, Watcher,
    DEFAULT_MAXLEN,
};

fn open_collection(temp_dir: &TempDir, name: &str) -> (Arc<Store>, Arc<Collection>) {
    let config = StoreConfig {
        backend: BackendConfig {
            data_dir: temp_dir.path().to_path_buf(),
            cache_size_mb: 64,
            flush_interval_ms: 1000,
        },
        ..Default::default()
    };
    let store = Store::open(config).unwrap();
    let collection = store.collection(name).unwrap();
    (store, collection)
}

fn seed(collection: &Collection, count: usize) {
    for i in 0..count {
        let key = format!("key/{:06}", i);
        collection
            .set(key.as_bytes(), b"value", i as f64, DEFAULT_MAXLEN)
            .unwrap();
    }
}

// ============================================================================
// Benchmark: Mutations
// ============================================================================

fn bench_mutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutations");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(5));

    let temp_dir = TempDir::new().unwrap();
    let (_store, collection) = open_collection(&temp_dir, "bench");

    for size in [64usize, 1024, 16 * 1024].iter() {
        let value = vec![b'x'; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("set_value_size", size), size, |b, _| {
            let mut counter = 0u64;
            b.iter(|| {
                counter += 1;
                let key = format!("set/{}", counter % 1000);
                collection
                    .set(black_box(key.as_bytes()), &value, 1.0, DEFAULT_MAXLEN)
                    .unwrap()
            })
        });
    }

    group.throughput(Throughput::Elements(1));
    group.bench_function("compare_and_set_hit", |b| {
        collection.set(b"cas", b"v", 0.0, DEFAULT_MAXLEN).unwrap();
        let mut version = 0.0;
        b.iter(|| {
            let result = collection
                .compare_and_set(
                    b"cas",
                    CompareOp::Equal,
                    version,
                    b"v",
                    version + 1.0,
                    DEFAULT_MAXLEN,
                )
                .unwrap();
            version += 1.0;
            black_box(result)
        })
    });

    group.bench_function("compare_and_set_miss", |b| {
        b.iter(|| {
            collection
                .compare_and_set(
                    b"cas",
                    CompareOp::Less,
                    f64::NEG_INFINITY,
                    b"v",
                    1.0,
                    DEFAULT_MAXLEN,
                )
                .unwrap()
        })
    });

    group.bench_function("set_then_remove", |b| {
        b.iter(|| {
            collection.set(b"tmp", b"v", 1.0, DEFAULT_MAXLEN).unwrap();
            collection.remove(b"tmp", DEFAULT_MAXLEN).unwrap()
        })
    });

    group.finish();
}

// ============================================================================
// Benchmark: Queries
// ============================================================================

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    let temp_dir = TempDir::new().unwrap();
    let (_store, collection) = open_collection(&temp_dir, "bench");
    seed(&collection, 10_000);

    group.bench_function("get_hit", |b| {
        b.iter(|| collection.get(black_box(b"key/005000")))
    });
    group.bench_function("get_miss", |b| {
        b.iter(|| collection.get(black_box(b"missing")))
    });

    for count in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        let max = format!("(key/{:06}", count);
        let range = KeyRange::parse(b"[key/000000", max.as_bytes()).unwrap();
        group.bench_with_input(BenchmarkId::new("key_range", count), count, |b, _| {
            b.iter(|| collection.get_key_range(black_box(&range)))
        });

        let max = format!("({}", count);
        let range = VersionRange::parse("0", &max).unwrap();
        group.bench_with_input(BenchmarkId::new("version_range", count), count, |b, _| {
            b.iter(|| collection.get_version_range(black_box(&range)))
        });
    }

    group.throughput(Throughput::Elements(10_000));
    group.bench_function("get_all_10000", |b| b.iter(|| collection.get_all()));

    group.finish();
}

// ============================================================================
// Benchmark: Watch
// ============================================================================

fn bench_watch(c: &mut Criterion) {
    let mut group = c.benchmark_group("watch");
    group.sample_size(20);

    let runtime = tokio::runtime::Runtime::new().unwrap();

    for batch in [1usize, 100].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::new("next_batch", batch), batch, |b, &batch| {
            let temp_dir = TempDir::new().unwrap();
            let (_store, collection) = open_collection(&temp_dir, "bench");
            let mut watcher = Watcher::new(&collection, Revision::ZERO, Duration::from_secs(1));

            b.iter(|| {
                for i in 0..batch {
                    let key = format!("w/{}", i);
                    collection
                        .set(key.as_bytes(), b"v", 1.0, DEFAULT_MAXLEN)
                        .unwrap();
                }
                let events = runtime.block_on(watcher.next_batch()).unwrap().unwrap();
                black_box(events.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mutations, bench_queries, bench_watch);
criterion_main!(benches);
