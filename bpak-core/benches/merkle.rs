use bpak_core::merkle::{verify_block, MerkleTreeBuilder};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SALT: [u8; 32] = [0x7A; 32];

fn bench_build_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle_build");

    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let payload = vec![0x42u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                let mut builder = MerkleTreeBuilder::new(SALT);
                builder.update(black_box(payload));
                builder.finish(payload.len() as u64).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_verify_block(c: &mut Criterion) {
    let size = 1024 * 1024;
    let payload = vec![0x42u8; size];
    let mut builder = MerkleTreeBuilder::new(SALT);
    builder.update(&payload);
    let (_root, tree_bytes) = builder.finish(payload.len() as u64).unwrap();
    let n_blocks = (payload.len() + 4095) / 4096;
    let block = &payload[0..4096];

    c.bench_function("merkle_verify_block", |b| {
        b.iter(|| verify_block(black_box(&tree_bytes), n_blocks, &SALT, 0, block).unwrap());
    });
}

criterion_group!(benches, bench_build_tree, bench_verify_block);
criterion_main!(benches);
