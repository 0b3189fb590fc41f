//! Benchmarks for the CPU radix sort.
//!
//! Run with: `cargo bench --bench radix_sort`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowsort::RadixSorter;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_keys(len: usize, key_range: u32) -> Vec<u32> {
    let mut rng = SmallRng::seed_from_u64(42);
    (0..len).map(|_| rng.gen_range(0..key_range)).collect()
}

fn bench_particle_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("radix_sort_len");

    for len in [10_000usize, 65_536, 262_144] {
        let keys = random_keys(len, 1024);
        let mut sorter = RadixSorter::new(len, 256, 1024).unwrap();
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &keys, |b, keys| {
            b.iter(|| black_box(sorter.sort(keys)[0]))
        });
    }

    group.finish();
}

fn bench_key_ranges(c: &mut Criterion) {
    let mut group = c.benchmark_group("radix_sort_key_range");
    let len = 65_536;

    // Pass count grows with the key range: 1, 5, 8 and 16 passes
    for key_range in [4u32, 1024, 1 << 16, u32::MAX] {
        let keys = random_keys(len, key_range);
        let mut sorter = RadixSorter::new(len, 256, key_range).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(key_range), &keys, |b, keys| {
            b.iter(|| black_box(sorter.sort(keys)[0]))
        });
    }

    group.finish();
}

fn bench_block_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("radix_sort_block_size");
    let len = 65_536;
    let keys = random_keys(len, 1024);

    for block_size in [32u32, 64, 128, 256] {
        let mut sorter = RadixSorter::new(len, block_size, 1024).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(block_size), &keys, |b, keys| {
            b.iter(|| black_box(sorter.sort(keys)[0]))
        });
    }

    group.finish();
}

fn bench_std_reference(c: &mut Criterion) {
    let len = 65_536;
    let keys = random_keys(len, 1024);

    c.bench_function("std_sort_by_key_65536", |b| {
        b.iter(|| {
            let mut perm: Vec<u32> = (0..len as u32).collect();
            perm.sort_by_key(|&i| keys[i as usize]);
            black_box(perm[0])
        })
    });
}

criterion_group!(
    benches,
    bench_particle_counts,
    bench_key_ranges,
    bench_block_sizes,
    bench_std_reference,
);
criterion_main!(benches);
