use criterion::{criterion_group, criterion_main, Criterion};
use md5_collide::inject::{GzipInjector, Injector};
use md5_collide::md5::{block_words, compress, ChainingState, BLOCK_SIZE};
use md5_collide::{md5, WANG_COLLISION_1};
use std::collections::BTreeMap;
use std::hint::black_box;

fn bench_our_md5(c: &mut Criterion) {
    let data = vec![0x5Au8; 64 * 1024];
    c.bench_function("our_md5_64k", |b| b.iter(|| md5(black_box(&data))));
}

fn bench_reference_md5(c: &mut Criterion) {
    let data = vec![0x5Au8; 64 * 1024];
    c.bench_function("reference_md5_64k", |b| b.iter(|| reference_md5::compute(black_box(&data))));
}

fn bench_compress(c: &mut Criterion) {
    let block = [0x61u8; BLOCK_SIZE];
    let words = block_words(&block);
    c.bench_function("compress_block", |b| {
        b.iter(|| compress(black_box(ChainingState::STANDARD), black_box(&words)))
    });
}

fn bench_gzip_inject(c: &mut Criterion) {
    let mut tree_a = BTreeMap::new();
    tree_a.insert("README.txt".to_string(), b"benign".repeat(2000));
    let mut tree_b = BTreeMap::new();
    tree_b.insert("README.txt".to_string(), b"malicious".repeat(2000));
    let injector = GzipInjector::new(&tree_a, &tree_b).unwrap();
    let plan = injector.plan().unwrap();

    // Shape of a UniColl answer; only the layout is timed
    let mut pair = WANG_COLLISION_1.blocks();
    pair.a[..plan.head.len()].copy_from_slice(&plan.head);
    pair.b = pair.a.clone();
    pair.b[9] += 1;

    c.bench_function("gzip_inject", |b| {
        b.iter(|| injector.inject(black_box(&plan), black_box(&pair)).unwrap().assemble())
    });
}

criterion_group!(benches, bench_our_md5, bench_reference_md5, bench_compress, bench_gzip_inject);
criterion_main!(benches);
