//! Benchmarks for InputHistory operations
//!
//! Run with: cargo bench --bench input_history

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use paddle_rollback::{Frame, InputHistory, PlayerInput, PlayerNumber};

fn bench_start_new_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("InputHistory::start_new_frame");

    for delta in [1u32, 10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("delta", delta), delta, |b, &delta| {
            let mut history = InputHistory::new();
            b.iter(|| {
                let target = history.current_frame() + black_box(delta);
                history.start_new_frame(target);
            });
        });
    }

    group.finish();
}

fn bench_set_input(c: &mut Criterion) {
    let mut group = c.benchmark_group("InputHistory::set_input");

    group.bench_function("in_order", |b| {
        let mut history = InputHistory::new();
        let mut frame = Frame::ZERO;
        b.iter(|| {
            frame += 1;
            history
                .set_input(PlayerNumber::new(0), black_box(PlayerInput::UP), frame)
                .unwrap();
        });
    });

    group.bench_function("late_with_prediction_refill", |b| {
        b.iter_batched(
            || {
                let mut history = InputHistory::new();
                history.start_new_frame(Frame::new(100));
                history
            },
            |mut history| {
                history
                    .set_input(PlayerNumber::new(1), PlayerInput::DOWN, Frame::new(1))
                    .unwrap();
                black_box(history)
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_start_new_frame, bench_set_input);
criterion_main!(benches);
