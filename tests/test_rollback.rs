//! End-to-end rollback behavior: validation, confirmation, scoring and provisional entities.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]

#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{feed_both, new_game, new_game_with_ball, pattern, P0, P1};
use glam::Vec2;
use paddle_rollback::__internal::ball;
use paddle_rollback::telemetry::{CollectingObserver, InvariantChecker, ViolationKind};
use paddle_rollback::{
    Ball, Body, ComponentTable, Entity, Frame, FrameConfirmation, GameConfig, GameManager,
    PhysicsManager, PhysicsState, PlayerCharacter, PlayerInput, RollbackError,
};

// ============================================================================
// Validation
// ============================================================================

#[test]
fn validation_waits_for_every_frame_of_every_player() {
    let mut game = new_game(GameConfig::default());
    for frame in 1..=10 {
        game.set_player_input(P0, PlayerInput::UP, Frame::new(frame))
            .unwrap();
    }
    for frame in 1..=4 {
        game.set_player_input(P1, PlayerInput::DOWN, Frame::new(frame))
            .unwrap();
    }

    let err = game.validate(Frame::new(10)).unwrap_err();
    assert_eq!(
        err,
        RollbackError::IncompleteInput {
            frame: Frame::new(10),
            player: P1,
            last_received: Frame::new(4),
        }
    );
    assert!(err.is_fatal());
    assert_eq!(game.last_validate_frame(), Frame::ZERO);

    for frame in 5..=9 {
        game.set_player_input(P1, PlayerInput::DOWN, Frame::new(frame))
            .unwrap();
        assert!(game.validate(Frame::new(10)).is_err());
    }
    game.set_player_input(P1, PlayerInput::DOWN, Frame::new(10))
        .unwrap();
    game.validate(Frame::new(10)).unwrap();
    assert_eq!(game.last_validate_frame(), Frame::new(10));
}

#[test]
fn failed_validation_leaves_state_untouched() {
    let mut game = new_game_with_ball(GameConfig::default(), Vec2::new(1.0, 1.0));
    for frame in 1..=6 {
        game.set_player_input(P0, PlayerInput::UP, Frame::new(frame))
            .unwrap();
    }
    game.tick();
    let current = game.rollback().current_track().clone();
    let validated = game.rollback().last_validated_track().clone();

    assert!(game.validate(Frame::new(6)).is_err());
    assert_eq!(game.rollback().current_track(), &current);
    assert_eq!(game.rollback().last_validated_track(), &validated);
}

#[test]
fn validated_frame_only_moves_forward() {
    let mut game = new_game(GameConfig::default());
    feed_both(&mut game, 1..=12, pattern(1));
    game.validate(Frame::new(8)).unwrap();

    let mut rollback_view = game.rollback().last_validated_track().clone();
    // An older confirmation is ignored.
    let stale = FrameConfirmation::new(Frame::new(4), [PhysicsState::new(1); 2]);
    game.receive_confirmation(&stale).unwrap();
    assert_eq!(game.last_validate_frame(), Frame::new(8));
    assert_eq!(game.rollback().last_validated_track(), &rollback_view);

    game.validate(Frame::new(12)).unwrap();
    assert_eq!(game.last_validate_frame(), Frame::new(12));
    rollback_view = game.rollback().last_validated_track().clone();
    assert_eq!(game.rollback().current_track(), &rollback_view);
}

#[test]
fn validating_past_the_current_frame_is_an_error() {
    let mut game = new_game(GameConfig::default());
    feed_both(&mut game, 1..=3, pattern(2));
    assert!(matches!(
        game.validate(Frame::new(4)),
        Err(RollbackError::InvalidFrame { .. })
    ));
}

#[test]
fn input_older_than_the_history_is_rejected() {
    let config = GameConfig::minimal();
    let length = config.input_history_length as u32;
    let mut game = new_game(config);
    feed_both(&mut game, 1..=length, pattern(4));
    game.validate(Frame::new(length)).unwrap();
    feed_both(&mut game, length + 1..=length + 4, pattern(4));

    assert!(matches!(
        game.set_player_input(P0, PlayerInput::UP, Frame::new(1)),
        Err(RollbackError::InvalidFrame { .. })
    ));
}

// ============================================================================
// Confirmation
// ============================================================================

#[test]
fn mismatched_confirmation_is_a_desync_and_keeps_local_state() {
    let observer = Arc::new(CollectingObserver::new());
    let mut game = new_game(GameConfig::default()).with_observer(observer.clone());
    feed_both(&mut game, 1..=5, |_, _| PlayerInput::UP);

    let mut reference = new_game(GameConfig::default());
    feed_both(&mut reference, 1..=5, |_, _| PlayerInput::UP);
    let honest = reference.validate(Frame::new(5)).unwrap();

    let mut tampered = honest;
    tampered.physics_states[1] = PhysicsState::new(tampered.physics_states[1].as_i32() ^ 1);
    let err = game.receive_confirmation(&tampered).unwrap_err();
    match err {
        RollbackError::Desync {
            frame,
            player,
            local,
            remote,
        } => {
            assert_eq!(frame, Frame::new(5));
            assert_eq!(player, P1);
            assert_eq!(local, honest.physics_states[1]);
            assert_eq!(remote, tampered.physics_states[1]);
        },
        other => panic!("expected a desync, got {other}"),
    }
    assert!(observer.has_violation(ViolationKind::ChecksumMismatch));

    // The local state is what the honest server computed, not the tampered value.
    assert_eq!(
        game.rollback().validated_physics_state(P1),
        honest.physics_states[1]
    );
}

// ============================================================================
// Scoring
// ============================================================================

#[test]
fn ball_past_the_right_edge_costs_player_zero_one_point() {
    let config = GameConfig::default();
    let mut balls = ComponentTable::<Ball>::new();
    let mut players = ComponentTable::<PlayerCharacter>::new();
    let mut physics = PhysicsManager::new();

    let paddle = Entity::new(0);
    players.set(paddle, PlayerCharacter::new(P0, config.player_health));
    physics.set_body(paddle, Body::default());
    let ball_entity = Entity::new(1);
    balls.set(ball_entity, Ball::default());
    physics.set_body(
        ball_entity,
        Body {
            position: Vec2::new(config.arena_extents.x + 0.1, 1.0),
            velocity: Vec2::new(1.0, 1.0),
        },
    );

    let conceded = ball::fixed_update(&mut balls, &mut players, &mut physics, &config);
    assert_eq!(conceded.as_slice(), &[P0]);
    assert_eq!(physics.body(ball_entity).unwrap().position, Vec2::ZERO);
    assert_eq!(
        players.get(paddle).unwrap().health,
        config.player_health - 1
    );
}

#[test]
fn scoring_happens_in_the_tick_the_ball_leaves() {
    let mut game = new_game(GameConfig::default());
    let ball = game.spawn_ball(Vec2::new(4.99, 0.0), Vec2::new(10.0, 0.0));
    let paddle = game.entity_from_player_number(P0);
    let health = |game: &GameManager| {
        game.rollback()
            .current_track()
            .player_character(paddle)
            .unwrap()
            .health
    };

    feed_both(&mut game, 1..=1, |_, _| PlayerInput::NONE);
    assert_eq!(health(&game), 5);
    assert!(game.rollback().current_track().body(ball).unwrap().position.x > 5.0);

    feed_both(&mut game, 2..=2, |_, _| PlayerInput::NONE);
    assert_eq!(health(&game), 4);
    let body = *game.rollback().current_track().body(ball).unwrap();
    // Reset to the center, then moved by one step.
    assert_eq!(body.position, Vec2::new(10.0 * 0.02, 0.0));
    assert_eq!(body.velocity, Vec2::new(10.0, 0.0));
}

// ============================================================================
// Provisional entities and deletes
// ============================================================================

#[test]
fn provisional_ball_is_replayed_then_promoted() {
    let mut game = new_game(GameConfig::default());
    feed_both(&mut game, 1..=3, pattern(5));
    let ball = game.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.0));
    let record = game.rollback().created_entities().next().unwrap();
    assert_eq!(record.entity, ball);
    assert_eq!(record.created_frame, Frame::new(3));

    game.tick();
    assert!(game.rollback().is_provisional(ball));
    assert!(game.rollback().current_track().ball(ball).is_some());
    assert!(game.rollback().last_validated_track().ball(ball).is_none());

    // Validating a frame before the spawn takes it off the tracks until the next tick.
    feed_both(&mut game, 4..=5, pattern(5));
    game.validate(Frame::new(2)).unwrap();
    assert!(game.rollback().current_track().ball(ball).is_none());
    assert!(game.rollback().last_validated_track().ball(ball).is_none());
    game.tick();
    assert!(game.rollback().current_track().ball(ball).is_some());
    let speculative = *game.rollback().current_track().body(ball).unwrap();

    game.validate(Frame::new(3)).unwrap();
    assert_eq!(game.rollback().created_entities().len(), 0);
    game.tick();
    assert!(game.rollback().entities().is_alive(ball));
    assert!(!game.rollback().is_provisional(ball));
    assert!(game.rollback().last_validated_track().ball(ball).is_some());
    assert_eq!(game.rollback().current_track().body(ball), Some(&speculative));
    assert_eq!(game.transforms().position(ball), Some(speculative.position));
    assert!(game.rollback().check_invariants().is_ok());
}

#[test]
fn destroyed_ball_is_restored_by_rollback_and_removed_by_validation() {
    let mut game = new_game_with_ball(GameConfig::default(), Vec2::new(0.0, 1.0));
    let ball = Entity::new(2);
    feed_both(&mut game, 1..=2, pattern(6));

    assert!(game.destroy_entity(ball));
    game.tick();
    assert!(game.rollback().is_destroyed(ball));
    assert!(game.transforms().is_hidden(ball));

    game.validate(Frame::new(1)).unwrap();
    assert!(game.rollback().entities().is_alive(ball));

    game.validate(Frame::new(2)).unwrap();
    assert!(!game.rollback().entities().is_alive(ball));
    assert!(game.transforms().get(ball).is_none());
    assert!(!game.destroy_entity(ball));
    assert!(game.rollback().check_invariants().is_ok());
}

#[test]
fn transforms_follow_the_current_track() {
    let mut game = new_game_with_ball(GameConfig::default(), Vec2::new(1.0, 1.0));
    feed_both(&mut game, 1..=15, pattern(8));
    let track = game.rollback().current_track();
    for (entity, body) in track.physics().bodies().iter() {
        assert_eq!(game.transforms().position(entity), Some(body.position));
    }
}
