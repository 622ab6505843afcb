/// Store and Index Benchmarks
///
/// Measures the two halves of the storage path:
/// - Store append throughput for several payload sizes
/// - Random reads by relative offset (index lookup + store read)
/// - Raw index lookups from the mapped region
///
/// No owner logic, no networking.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use proglog::config::SegmentConfig;
use proglog::storage::{Index, Store, ENT_WIDTH};

/// Test fixture: a store and index filled with deterministic records.
struct PairFixture {
    _temp_dir: TempDir,
    store: Store,
    index: Index,
    record_count: usize,
}

impl PairFixture {
    /// Each record is filled with (n % 256) as byte value.
    fn new(record_count: usize, record_size: usize) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = SegmentConfig {
            max_index_bytes: record_count as u64 * ENT_WIDTH,
            ..SegmentConfig::default()
        };

        let store = Store::open(temp_dir.path().join("0.store")).expect("failed to open store");
        let mut index = Index::open(temp_dir.path().join("0.index"), &config)
            .expect("failed to open index");

        for n in 0..record_count {
            let payload = vec![(n % 256) as u8; record_size];
            let (_, position) = store.append(&payload).expect("failed to append");
            index.write(n as u32, position).expect("failed to index");
        }
        store.flush().expect("failed to flush");

        Self {
            _temp_dir: temp_dir,
            store,
            index,
            record_count,
        }
    }
}

fn benchmark_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_append");

    for (record_size, size_label) in [(128, "128B"), (512, "512B"), (4096, "4KB")] {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let store = Store::open(temp_dir.path().join("0.store")).expect("failed to open store");
        let payload = vec![7u8; record_size];

        group.throughput(Throughput::Bytes(record_size as u64));
        group.bench_function(BenchmarkId::new("append", size_label), |b| {
            b.iter(|| {
                black_box(store.append(black_box(&payload)).expect("append failed"));
            });
        });
    }

    group.finish();
}

fn benchmark_read_by_offset(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_by_offset");
    let fixture = PairFixture::new(10_000, 512);

    group.throughput(Throughput::Bytes(512));
    group.bench_function("index_then_store", |b| {
        let mut n = 0usize;
        b.iter(|| {
            // Stride through the file so reads are not purely sequential
            n = (n + 7919) % fixture.record_count;
            let (_, position) = fixture.index.read(n as i64).expect("index read failed");
            black_box(fixture.store.read(position).expect("store read failed"));
        });
    });

    group.finish();
}

fn benchmark_index_lookup(c: &mut Criterion) {
    let fixture = PairFixture::new(10_000, 16);

    c.bench_function("index_lookup_last", |b| {
        b.iter(|| black_box(fixture.index.read(black_box(-1)).expect("read failed")));
    });
}

criterion_group!(benches, benchmark_append, benchmark_read_by_offset, benchmark_index_lookup);
criterion_main!(benches);
