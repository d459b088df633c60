//! Benchmark harness using Criterion for latency measurement.
//!
//! Measures:
//! - Add order (no match)
//! - Add order (full match) at varying book depth
//! - Cancel order at varying book size
//! - Mixed workload

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pulse_lob::{AddOrder, MatchCore, OutputEvent, PoolMode, Side, SubmitRequest};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Generate a random add request
fn random_add(rng: &mut ChaCha8Rng, id: u64) -> SubmitRequest {
    let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
    SubmitRequest::Add(AddOrder::good_till_cancel(
        id,
        side,
        rng.gen_range(9_900..10_100) * 100,
        rng.gen_range(1..1_000),
    ))
}

fn apply(core: &mut MatchCore, request: SubmitRequest, events: &mut Vec<OutputEvent>) {
    events.clear();
    core.apply(request, events);
}

/// Benchmark: add an order that rests (no matching)
fn bench_add_no_match(c: &mut Criterion) {
    let mut core = MatchCore::new(1_000_000, PoolMode::Degraded);
    core.warm_up();
    let mut events = Vec::with_capacity(64);

    let mut id = 0u64;

    c.bench_function("add_no_match", |b| {
        b.iter(|| {
            id += 1;
            let request = SubmitRequest::Add(AddOrder::good_till_cancel(
                id,
                Side::Buy,
                9_000, // Below any asks
                100,
            ));
            apply(&mut core, request, &mut events);
            black_box(&events);
        })
    });
}

/// Benchmark: add an order that fully matches against resting depth
fn bench_add_full_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_full_match");

    for depth in [1u64, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let mut core = MatchCore::new(100_000, PoolMode::Strict);
            core.warm_up();
            let mut events = Vec::with_capacity(64);

            for i in 0..depth {
                apply(
                    &mut core,
                    SubmitRequest::Add(AddOrder::good_till_cancel(i, Side::Sell, 10_000, 100)),
                    &mut events,
                );
            }

            let mut id = 1_000u64;

            b.iter(|| {
                id += 1;
                apply(
                    &mut core,
                    SubmitRequest::Add(AddOrder::good_till_cancel(id, Side::Buy, 10_000, 100)),
                    &mut events,
                );
                black_box(&events);

                // Replenish the consumed maker
                apply(
                    &mut core,
                    SubmitRequest::Add(AddOrder::good_till_cancel(
                        id + 1_000_000,
                        Side::Sell,
                        10_000,
                        100,
                    )),
                    &mut events,
                );
            })
        });
    }

    group.finish();
}

/// Benchmark: cancel an order
fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel");

    for book_size in [100u64, 1_000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(book_size),
            book_size,
            |b, &book_size| {
                let mut core = MatchCore::new(100_000, PoolMode::Strict);
                core.warm_up();
                let mut events = Vec::with_capacity(64);

                for i in 0..book_size {
                    let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = if i % 2 == 0 {
                        8_000 + (i % 100) * 10
                    } else {
                        10_000 + (i % 100) * 10
                    };
                    apply(
                        &mut core,
                        SubmitRequest::Add(AddOrder::good_till_cancel(i, side, price, 100)),
                        &mut events,
                    );
                }

                let mut cancel_id = 0u64;
                let mut next_id = book_size;

                b.iter(|| {
                    apply(&mut core, SubmitRequest::Cancel(cancel_id), &mut events);
                    black_box(&events);

                    // Replenish
                    let side = if cancel_id % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = if cancel_id % 2 == 0 {
                        8_000 + (cancel_id % 100) * 10
                    } else {
                        10_000 + (cancel_id % 100) * 10
                    };
                    apply(
                        &mut core,
                        SubmitRequest::Add(AddOrder::good_till_cancel(next_id, side, price, 100)),
                        &mut events,
                    );

                    cancel_id = next_id;
                    next_id += 1;
                })
            },
        );
    }

    group.finish();
}

/// Benchmark: mixed workload (realistic flow)
fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_workload");

    // 70% add, 30% cancel
    group.bench_function("70_add_30_cancel", |b| {
        let mut core = MatchCore::new(1_000_000, PoolMode::Degraded);
        core.warm_up();
        let mut events = Vec::with_capacity(64);

        let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF);
        let mut id = 0u64;

        for _ in 0..1_000 {
            id += 1;
            let request = random_add(&mut rng, id);
            apply(&mut core, request, &mut events);
        }

        b.iter(|| {
            if rng.gen_bool(0.7) {
                id += 1;
                let request = random_add(&mut rng, id);
                apply(&mut core, request, &mut events);
            } else {
                let cancel_id = rng.gen_range(1..=id);
                apply(&mut core, SubmitRequest::Cancel(cancel_id), &mut events);
            }
            black_box(&events);
        })
    });

    group.finish();
}

/// Benchmark: throughput (requests per second)
fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.throughput(criterion::Throughput::Elements(1_000));

    group.bench_function("1000_requests", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(0xCAFEBABE);
        let mut events = Vec::with_capacity(64);

        b.iter(|| {
            let mut core = MatchCore::new(100_000, PoolMode::Degraded);
            for i in 0..1_000 {
                let request = random_add(&mut rng, i);
                apply(&mut core, request, &mut events);
            }
            black_box(core.order_count())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_add_no_match,
    bench_add_full_match,
    bench_cancel,
    bench_mixed_workload,
    bench_throughput,
);

criterion_main!(benches);
