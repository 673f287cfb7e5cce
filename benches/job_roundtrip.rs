/* Cost of handing work to the coordinator thread and waiting for it. */

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use rustmounts::interface::{self, Coordinator, JobEntry, KeyValueStore, MemoryKvStore};

mod global_criterion_settings;

pub fn run_benchmark(c: &mut Criterion) {
    let coordinator = Coordinator::new();
    let runner = coordinator.spawn();

    let mut group = c.benchmark_group("Job roundtrip");

    // finish inline on the coordinator thread
    group.bench_function("run_job", |b| {
        b.iter(|| {
            assert_eq!(
                coordinator.run_job(Box::new(|entry: JobEntry| entry.finish(1))),
                1
            );
        })
    });

    // finish from a posted callback, the way host completions arrive
    for hops in [1usize, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::new("chained posts", hops), hops, |b, hops| {
            b.iter(|| {
                let inner = coordinator.clone();
                let hops = *hops;
                let result = coordinator.run_job(Box::new(move |entry: JobEntry| {
                    chain(inner, hops, entry);
                }));
                assert_eq!(result, 0);
            })
        });
    }

    let store = interface::RustRfc::new(MemoryKvStore::new(coordinator.clone()));
    store.set_value("/key", &[7u8; 4096]);
    group.bench_function("kv get", |b| {
        b.iter(|| {
            let store = store.clone();
            let result = coordinator.run_job(Box::new(move |entry: JobEntry| {
                store.get(
                    "/key",
                    Box::new(move |r: Result<Option<Vec<u8>>, i32>| {
                        entry.finish(r.map(|v| v.map_or(0, |v| v.len() as i32)).unwrap_or_else(|e| e))
                    }),
                );
            }));
            assert_eq!(result, 4096);
        })
    });

    group.finish();
    runner.shutdown();
}

fn chain(coordinator: Coordinator, hops: usize, entry: JobEntry) {
    if hops == 0 {
        entry.finish(0);
        return;
    }
    let next = coordinator.clone();
    coordinator.post(move || chain(next, hops - 1, entry));
}

criterion_group!(name=benches;
                 config=global_criterion_settings::get_criterion();
                 targets=run_benchmark);
criterion_main!(benches);
