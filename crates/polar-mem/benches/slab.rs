//! Slab allocator and array recycler benchmarks.
//!
//! Measures:
//! - Small bump allocations (fast path)
//! - Slab turnover when requests keep overflowing the current slab
//! - Reset-and-reuse cycles
//! - Recycled versus fresh array allocation

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion,
};
use polar_mem::{ArrayRecycler, BumpPtrAllocator, Capacity};

fn bench_small_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("slab_small");

    for count in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let allocator = BumpPtrAllocator::new();
                for i in 0..count {
                    black_box(allocator.alloc(i as u64));
                }
            });
        });
    }

    group.finish();
}

fn bench_slab_turnover(c: &mut Criterion) {
    c.bench_function("slab_turnover_3000", |b| {
        b.iter(|| {
            let allocator = BumpPtrAllocator::new();
            for _ in 0..64 {
                black_box(allocator.allocate(3000, 8));
            }
            black_box(allocator.num_slabs())
        });
    });
}

fn bench_reset_cycle(c: &mut Criterion) {
    c.bench_function("slab_reset_cycle", |b| {
        let mut allocator = BumpPtrAllocator::new();
        b.iter(|| {
            for i in 0..512u64 {
                black_box(allocator.alloc([i; 4]));
            }
            allocator.reset();
        });
    });
}

fn bench_recycler(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_recycler");
    let cap = Capacity::get(16);

    group.bench_function("recycled", |b| {
        let allocator = BumpPtrAllocator::new();
        let mut recycler = ArrayRecycler::<u64>::new();
        b.iter(|| {
            let ptr = recycler.allocate(cap, &allocator);
            unsafe { recycler.deallocate(cap, black_box(ptr)) };
        });
        recycler.clear(&allocator);
    });

    group.bench_function("fresh", |b| {
        b.iter_batched_ref(
            BumpPtrAllocator::new,
            |allocator| black_box(allocator.allocate_array::<u64>(cap.size())),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_small_allocations,
    bench_slab_turnover,
    bench_reset_cycle,
    bench_recycler
);
criterion_main!(benches);
