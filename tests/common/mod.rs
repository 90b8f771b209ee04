//! Common test infrastructure shared across integration tests.
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::{feed_both, new_game};
//! ```

#![allow(dead_code)]

use std::ops::RangeInclusive;
use std::sync::Once;

use glam::Vec2;
use paddle_rollback::{Frame, GameConfig, GameManager, PlayerInput, PlayerNumber};

pub const P0: PlayerNumber = PlayerNumber::new(0);
pub const P1: PlayerNumber = PlayerNumber::new(1);

static TRACING: Once = Once::new();

/// Routes library logs to the test output. Set `RUST_LOG`-style levels with
/// `PADDLE_TEST_LOG=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let level = match std::env::var("PADDLE_TEST_LOG").as_deref() {
            Ok("trace") => tracing::Level::TRACE,
            Ok("debug") => tracing::Level::DEBUG,
            _ => tracing::Level::WARN,
        };
        let _ = tracing::subscriber::set_global_default(
            tracing_subscriber::FmtSubscriber::builder()
                .with_max_level(level)
                .with_test_writer()
                .finish(),
        );
    });
}

/// A game with both paddles at their configured spawns.
pub fn new_game(config: GameConfig) -> GameManager {
    init_tracing();
    let mut game = GameManager::new(config).expect("valid config");
    game.spawn_default_players().expect("players spawn");
    game
}

/// A game with both paddles and a ball at the center.
pub fn new_game_with_ball(config: GameConfig, velocity: Vec2) -> GameManager {
    let mut game = new_game(config);
    game.spawn_ball(Vec2::ZERO, velocity);
    game
}

/// Feeds both players' input for every frame in `frames`, ticking after each frame.
pub fn feed_both(
    game: &mut GameManager,
    frames: RangeInclusive<u32>,
    input: impl Fn(PlayerNumber, u32) -> PlayerInput,
) {
    for frame in frames {
        for player in PlayerNumber::all() {
            game.set_player_input(player, input(player, frame), Frame::new(frame))
                .expect("input accepted");
        }
        game.tick();
    }
}

/// A cheap deterministic input pattern derived from `seed`.
pub fn pattern(seed: u32) -> impl Fn(PlayerNumber, u32) -> PlayerInput {
    move |player, frame| {
        let mixed = frame
            .wrapping_mul(2_654_435_761)
            .wrapping_add(seed)
            .wrapping_add(u32::from(player.as_u8()) * 7);
        PlayerInput::from_bits((mixed >> 13) as u8 & 0b11)
    }
}
