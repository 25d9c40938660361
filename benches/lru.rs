use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ghostkit::lru::LruCache;
use std::hint::black_box;

type Cache = LruCache<u32, u32>;

fn warm_cache(capacity: usize) -> Cache {
    let mut cache = Cache::new(capacity);
    for key in 0..capacity as u32 {
        cache.insert(key, false);
    }
    cache
}

fn bench_lru_fill(c: &mut Criterion) {
    c.bench_function("lru_fill", |b| {
        b.iter_batched(
            || Cache::new(1024),
            |mut cache| {
                for key in 0..1024u32 {
                    black_box(cache.insert(black_box(key), false));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_lru_hit(c: &mut Criterion) {
    c.bench_function("lru_hit", |b| {
        b.iter_batched(
            || warm_cache(1024),
            |mut cache| {
                for key in 0..1024u32 {
                    black_box(cache.lookup(black_box(key), false));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_lru_miss_churn(c: &mut Criterion) {
    c.bench_function("lru_miss_churn", |b| {
        b.iter_batched(
            || warm_cache(1024),
            |mut cache| {
                for key in 0..4096u32 {
                    black_box(cache.insert(black_box(10_000 + key), false));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_lru_pin_release(c: &mut Criterion) {
    c.bench_function("lru_pin_release", |b| {
        b.iter_batched(
            || warm_cache(1024),
            |mut cache| {
                for key in 0..1024u32 {
                    if let Some(h) = cache.lookup(black_box(key), true) {
                        cache.release(h);
                    }
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_lru_fill,
    bench_lru_hit,
    bench_lru_miss_churn,
    bench_lru_pin_release
);
criterion_main!(benches);
