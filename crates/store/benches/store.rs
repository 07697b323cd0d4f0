use std::time::Duration;

use avl_store::{MemoryNodeStore, NodeStore};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;

fn commit_n(n: usize) {
    let mut store = MemoryNodeStore::new();
    let mut rng = rand::thread_rng();
    for _ in 0..n {
        let key: [u8; 32] = rng.gen();
        let value: [u8; 32] = rng.gen();
        store.set(&key, &value).unwrap();
    }
    store.commit().unwrap();
}

fn commit(c: &mut Criterion) {
    let mut grp = c.benchmark_group("commit");
    grp.sample_size(20);
    grp.warm_up_time(Duration::from_secs(1));

    for size in [16, 256, 4096] {
        grp.throughput(criterion::Throughput::Elements(size as u64));
        grp.bench_with_input(BenchmarkId::new("set_then_commit", size), &size, |b, &n| {
            b.iter(|| commit_n(n))
        });
    }
}

criterion_group!(benches, commit);
criterion_main!(benches);
