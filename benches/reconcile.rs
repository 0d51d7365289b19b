//! Benchmarks for the reconciliation hot path
//!
//! - In-order contributions from a small mesh resolving every frame
//! - Late contributions forcing a rewind and replay across the window
//!
//! Run with `cargo bench --features benchmark`.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tandem::reconciler::Reconciler;
use tandem::test_utils::{TestEvent, TestGame, contribution, initial_frame, test_params};
use tandem::types::FrameBundle;

const FRAMES: i64 = 20;

fn bundles(engines: u64) -> Vec<FrameBundle<TestEvent>> {
    (1..=FRAMES)
        .flat_map(|frame| {
            (1..=engines).map(move |engine| contribution(frame, engine, vec![TestEvent::A(frame)]))
        })
        .collect()
}

fn fresh(engines: u64) -> Reconciler<TestGame> {
    let members: Vec<u64> = (1..=engines).collect();
    Reconciler::start(&test_params(1), 0, initial_frame(&members))
}

fn bench_in_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_in_order");
    for engines in [2u64, 4, 8] {
        let input = bundles(engines);
        group.throughput(Throughput::Elements(input.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(engines), &input, |b, input| {
            b.iter(|| {
                let mut reconciler = fresh(engines);
                for bundle in input.iter().cloned() {
                    black_box(reconciler.handle_remote(bundle).ok());
                }
                black_box(reconciler.start_frame())
            })
        });
    }
    group.finish();
}

fn bench_late_arrival(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_late_arrival");
    for engines in [2u64, 4, 8] {
        // Engine 1's contributions arrive last, so every frame is replayed.
        let (mut late, mut input): (Vec<_>, Vec<_>) = bundles(engines)
            .into_iter()
            .partition(|bundle| bundle.bundle.keys().any(|id| id.get() == 1));
        late.reverse();
        input.extend(late);

        group.throughput(Throughput::Elements(input.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(engines), &input, |b, input| {
            b.iter(|| {
                let mut reconciler = fresh(engines);
                for bundle in input.iter().cloned() {
                    black_box(reconciler.handle_remote(bundle).ok());
                }
                black_box(reconciler.start_frame())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_in_order, bench_late_arrival);
criterion_main!(benches);
