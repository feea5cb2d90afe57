use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cardiovar_core::{DataKind, SourceKey};
use cardiovar_infra::cache::{CacheStore, InMemoryCacheStore, SqliteCacheStore};
use serde_json::json;

fn ttl() -> chrono::Duration {
    chrono::Duration::hours(24)
}

fn payload() -> serde_json::Value {
    json!({
        "gene_symbol": "MYH9",
        "protein_length": 1960,
        "protein_domains": [
            {"name": "Myosin N-terminal SH3-like", "start": 29, "end": 79},
            {"name": "Myosin motor", "start": 82, "end": 778},
        ],
    })
}

fn key(i: u64) -> String {
    SourceKey::variant("chr22", 36_191_000 + i, "A", "C").cache_key(DataKind::GnomadFrequency)
}

fn bench_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_set_get");
    group.throughput(Throughput::Elements(1));

    let sqlite = SqliteCacheStore::in_memory(ttl()).unwrap();
    let memory = InMemoryCacheStore::new(ttl());
    let stores: [(&str, &dyn CacheStore); 2] = [("sqlite", &sqlite), ("in_memory", &memory)];

    for (name, store) in stores {
        group.bench_function(BenchmarkId::new("set", name), |b| {
            let value = payload();
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                store.set(&key(i % 1_000), black_box(&value), None).unwrap();
            });
        });

        for i in 0..1_000 {
            store.set(&key(i), &payload(), None).unwrap();
        }
        group.bench_function(BenchmarkId::new("get_hit", name), |b| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                black_box(store.get(&key(i % 1_000)).unwrap());
            });
        });
        group.bench_function(BenchmarkId::new("get_miss", name), |b| {
            b.iter(|| black_box(store.get("gnomad:chrX:1:G:T").unwrap()));
        });
    }

    group.finish();
}

fn bench_invalidate_pattern(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_invalidate_pattern");

    for size in [100u64, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::new("sqlite", size), size, |b, &size| {
            let store = SqliteCacheStore::in_memory(ttl()).unwrap();
            b.iter(|| {
                for i in 0..size {
                    store.set(&key(i), &json!(i), None).unwrap();
                }
                black_box(store.invalidate_pattern("gnomad:chr22:%").unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_set_get, bench_invalidate_pattern);
criterion_main!(benches);
