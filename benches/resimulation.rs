//! Benchmarks for resimulation and validation.
//!
//! Run with: cargo bench --bench resimulation

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use paddle_rollback::{Frame, GameConfig, PlayerInput, PlayerNumber, RollbackManager};

fn manager_ahead_by(frames: u32) -> RollbackManager {
    let mut manager = RollbackManager::new(GameConfig::competitive()).unwrap();
    manager
        .spawn_player(PlayerNumber::new(0), Vec2::new(1.0, 0.0), 0.0)
        .unwrap();
    manager
        .spawn_player(PlayerNumber::new(1), Vec2::new(-1.0, 0.0), 180.0)
        .unwrap();
    manager.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.7));
    for frame in 1..=frames {
        let input = if frame % 3 == 0 {
            PlayerInput::UP
        } else {
            PlayerInput::DOWN
        };
        for player in PlayerNumber::all() {
            manager
                .set_player_input(player, input, Frame::new(frame))
                .unwrap();
        }
    }
    manager
}

fn bench_simulate_to_current_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate_to_current_frame");

    for frames in [1u32, 8, 32, 128].iter() {
        group.bench_with_input(BenchmarkId::new("frames", frames), frames, |b, &frames| {
            let mut manager = manager_ahead_by(frames);
            b.iter(|| {
                manager.simulate_to_current_frame();
                black_box(manager.current_track());
            });
        });
    }

    group.finish();
}

fn bench_validate_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_frame");

    for frames in [1u32, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::new("frames", frames), frames, |b, &frames| {
            b.iter_batched(
                || manager_ahead_by(frames),
                |mut manager| {
                    manager.validate_frame(Frame::new(frames)).unwrap();
                    black_box(manager.validated_physics_states())
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_simulate_to_current_frame, bench_validate_frame);
criterion_main!(benches);
