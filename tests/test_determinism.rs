//! Determinism across independent instances.
//!
//! Two nodes fed the same inputs must end up with bit-identical tracks, whatever order the
//! inputs arrived in and however often they resimulated in between.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]

#[path = "common/mod.rs"]
mod common;

use common::{feed_both, new_game, new_game_with_ball, pattern, P0, P1};
use glam::Vec2;
use paddle_rollback::checksum::state_checksum;
use paddle_rollback::network::codec;
use paddle_rollback::{
    Body, Frame, FrameConfirmation, GameConfig, PhysicsState, PlayerInput, PlayerNumber,
};

#[test]
fn both_players_holding_up_match_bit_for_bit() {
    let mut first = new_game_with_ball(GameConfig::default(), Vec2::new(1.0, 1.0));
    let mut second = new_game_with_ball(GameConfig::default(), Vec2::new(1.0, 1.0));

    feed_both(&mut first, 1..=10, |_, _| PlayerInput::UP);
    feed_both(&mut second, 1..=10, |_, _| PlayerInput::UP);

    let a = first.rollback().current_track();
    let b = second.rollback().current_track();
    assert_eq!(a, b);
    assert_eq!(state_checksum(a).unwrap(), state_checksum(b).unwrap());

    for (entity, body) in a.physics().bodies().iter() {
        let other = b.body(entity).unwrap();
        assert_eq!(body.position.x.to_bits(), other.position.x.to_bits());
        assert_eq!(body.position.y.to_bits(), other.position.y.to_bits());
        assert_eq!(body.velocity.x.to_bits(), other.velocity.x.to_bits());
        assert_eq!(body.velocity.y.to_bits(), other.velocity.y.to_bits());
    }

    let first_confirmation = first.validate(Frame::new(10)).unwrap();
    let second_confirmation = second.validate(Frame::new(10)).unwrap();
    assert_eq!(first_confirmation, second_confirmation);
}

#[test]
fn late_input_converges_with_on_time_input() {
    let config = GameConfig::default();
    let input = pattern(17);

    let mut on_time = new_game_with_ball(config, Vec2::new(1.0, 0.5));
    feed_both(&mut on_time, 1..=30, &input);

    // P1's inputs all arrive at once, after P0 already ran 30 frames ahead.
    let mut late = new_game_with_ball(config, Vec2::new(1.0, 0.5));
    for frame in 1..=30 {
        late.set_player_input(P0, input(P0, frame), Frame::new(frame))
            .unwrap();
        late.tick();
    }
    for frame in 1..=30 {
        late.set_player_input(P1, input(P1, frame), Frame::new(frame))
            .unwrap();
    }
    late.tick();

    assert_eq!(
        late.rollback().current_track(),
        on_time.rollback().current_track()
    );
    for entity in on_time.player_entities() {
        assert_eq!(
            late.transforms().position(entity),
            on_time.transforms().position(entity)
        );
    }
}

#[test]
fn resimulating_twice_changes_nothing() {
    let mut game = new_game_with_ball(GameConfig::default(), Vec2::new(-1.0, 0.3));
    feed_both(&mut game, 1..=20, pattern(3));
    let once = game.rollback().current_track().clone();
    game.tick();
    game.tick();
    assert_eq!(game.rollback().current_track(), &once);
}

#[test]
fn body_at_rest_at_origin_has_zero_checksum() {
    assert_eq!(PhysicsState::from_body(&Body::default()), PhysicsState::ZERO);
    assert_eq!(PhysicsState::from_body(&Body::default()).as_i32(), 0);
}

#[test]
fn unspawned_players_confirm_zero() {
    let mut game = paddle_rollback::GameManager::new(GameConfig::default()).unwrap();
    game.spawn_player(P0, Vec2::new(1.0, 0.0), 0.0).unwrap();
    for player in PlayerNumber::all() {
        game.set_player_input(player, PlayerInput::NONE, Frame::new(1))
            .unwrap();
    }
    let confirmation = game.validate(Frame::new(1)).unwrap();
    assert_eq!(confirmation.physics_states[1], PhysicsState::ZERO);
    assert_ne!(confirmation.physics_states[0], PhysicsState::ZERO);
}

#[test]
fn confirmation_survives_the_wire() {
    let mut server = new_game(GameConfig::default());
    let mut client = new_game(GameConfig::default());
    feed_both(&mut server, 1..=5, pattern(9));
    feed_both(&mut client, 1..=5, pattern(9));

    let confirmation = server.validate(Frame::new(5)).unwrap();
    let bytes = codec::encode(&confirmation).unwrap();
    let (decoded, _): (FrameConfirmation, usize) = codec::decode(&bytes).unwrap();
    assert_eq!(decoded, confirmation);
    client.receive_confirmation(&decoded).unwrap();
    assert_eq!(
        client.rollback().last_validated_track(),
        server.rollback().last_validated_track()
    );
}
