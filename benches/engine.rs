use criterion::{BatchSize, Criterion, SamplingMode, criterion_group, criterion_main};
use std::time::Duration;
use tempfile::TempDir;
use twinlog::Store;

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("writes");
    group.sampling_mode(SamplingMode::Auto);
    group.warm_up_time(Duration::from_secs(3));
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("sequential_set_1k", |b| {
        b.iter_batched(
            BenchContext::new,
            |ctx| {
                for i in 0..1_000 {
                    ctx.store.set(i, "v").unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("reads");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(8));
    group.bench_function("sequential_get_1k", |b| {
        b.iter_batched(
            || {
                let ctx = BenchContext::new();
                for i in 0..1_000 {
                    ctx.store.set(i, "v").unwrap();
                }
                ctx
            },
            |ctx| {
                for i in 0..1_000 {
                    let _ = ctx.store.get(i).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_reclaim(c: &mut Criterion) {
    let mut group = c.benchmark_group("reclaim");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("reclaim_cycle", |b| {
        b.iter_batched(
            || {
                let ctx = BenchContext::new();
                for i in 0..2_000 {
                    ctx.store.set(i, format!("value-{i}")).unwrap();
                    if i % 2 == 0 {
                        ctx.store.del(i).unwrap();
                    }
                }
                ctx
            },
            |ctx| {
                ctx.store.reclaim().unwrap();
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

struct BenchContext {
    store: Store,
    _dir: TempDir,
}

impl BenchContext {
    fn new() -> Self {
        let dir = TempDir::new().expect("bench dir");
        let store = Store::builder(dir.path())
            .sync_interval(Duration::from_secs(1))
            .build()
            .expect("store");
        Self { store, _dir: dir }
    }
}

criterion_group!(benches, bench_set, bench_get, bench_reclaim);
criterion_main!(benches);
