use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hashbin::inventory::list_inventory;
use hashbin::{ContentStore, Submission};
use tempfile::TempDir;

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    for size in [1024usize, 64 * 1024, 1024 * 1024].iter() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();
        let submission = Submission::new(vec![0xAB; *size], "bin", "blob.bin", "bench");

        // Repeated stores of the same submission exercise the idempotent path.
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| store.store(black_box(&submission)).unwrap());
        });
    }
    group.finish();
}

fn bench_inventory(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_inventory");

    for count in [100usize, 1000].iter() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();
        for i in 0..*count {
            let submission = Submission::new(
                format!("item {}", i).into_bytes(),
                "txt",
                format!("item{}.txt", i),
                format!("category{}", i % 10),
            );
            store.store(&submission).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| list_inventory(black_box(store.layout())).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_store, bench_inventory);
criterion_main!(benches);
