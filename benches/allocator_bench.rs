//! Benchmarks for the epoch allocation sweep.
//!
//! Validates epoch cost across tenant counts and pool shapes, and the cost
//! of tenant churn between epochs.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use karma_alloc::{KarmaAllocator, KarmaConfig};
use std::hint::black_box;

fn populated(num_tenants: u32, num_blocks: u64, alpha: f32) -> KarmaAllocator {
    let config = KarmaConfig::with_blocks(num_blocks)
        .alpha(alpha)
        .init_credits(100);
    let mut karma = KarmaAllocator::new(config).expect("valid config");

    for id in 1..=num_tenants {
        karma.add_tenant(id).expect("fresh id");
        // Alternate under- and over-demanders so both sweeps get exercised.
        let demand = if id % 2 == 0 { 1 } else { 40 };
        karma.set_demand(id, demand, false).expect("known id");
    }
    karma
}

/// Benchmark a full epoch at varying tenant counts.
fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator/allocate");

    for num_tenants in [16u32, 64, 256] {
        let num_blocks = u64::from(num_tenants) * 16;
        group.throughput(Throughput::Elements(u64::from(num_tenants)));

        group.bench_with_input(
            BenchmarkId::new("tenants", num_tenants),
            &num_tenants,
            |b, &n| {
                b.iter(|| {
                    let mut karma = populated(n, num_blocks, 0.25);
                    karma.allocate();
                    black_box(karma.stats())
                });
            },
        );
    }

    group.finish();
}

/// Benchmark repeated epochs on one instance, where credit balances drift
/// apart and plateaus fragment.
fn bench_epoch_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator/epoch_sequence");
    group.throughput(Throughput::Elements(20));

    group.bench_function("64_tenants_20_epochs", |b| {
        b.iter(|| {
            let mut karma = populated(64, 1024, 0.25);
            for epoch in 0..20u32 {
                for id in 1..=64 {
                    let demand = (id * 7 + epoch * 3) % 32;
                    karma.set_demand(id, demand, false).expect("known id");
                }
                karma.allocate();
            }
            black_box(karma.stats())
        });
    });

    group.finish();
}

/// Benchmark tenant churn between epochs.
fn bench_tenant_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator/tenant_churn");
    group.throughput(Throughput::Elements(100));

    group.bench_function("add_remove_100", |b| {
        b.iter(|| {
            let mut karma = populated(32, 512, 0.0);
            for id in 1_000..1_100 {
                karma.add_tenant(id).expect("fresh id");
                karma.remove_tenant(id).expect("known id");
            }
            black_box(karma.num_tenants())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_allocate,
    bench_epoch_sequence,
    bench_tenant_churn
);
criterion_main!(benches);
