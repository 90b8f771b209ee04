//! Fuzz target for RollbackManager operation sequences.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary operation sequences
//! - The last validated frame never decreases and never passes the current frame
//! - Manager invariants hold after every operation

#![no_main]

use arbitrary::Arbitrary;
use glam::Vec2;
use libfuzzer_sys::fuzz_target;
use paddle_rollback::telemetry::InvariantChecker;
use paddle_rollback::{Entity, Frame, GameConfig, PlayerInput, PlayerNumber, RollbackManager};

#[derive(Debug, Arbitrary)]
enum ManagerOp {
    SetInput { player: u8, frame: u8, bits: u8 },
    Simulate,
    Validate { frame: u8 },
    SpawnBall { x: i8, y: i8, vx: i8, vy: i8 },
    Destroy { entity: u8 },
}

fuzz_target!(|operations: Vec<ManagerOp>| {
    let Ok(mut manager) = RollbackManager::new(GameConfig::minimal()) else {
        return;
    };
    let _ = manager.spawn_player(PlayerNumber::new(0), Vec2::new(1.0, 0.0), 0.0);
    let _ = manager.spawn_player(PlayerNumber::new(1), Vec2::new(-1.0, 0.0), 180.0);

    for op in operations.into_iter().take(500) {
        let validated = manager.last_validate_frame();
        match op {
            ManagerOp::SetInput { player, frame, bits } => {
                let _ = manager.set_player_input(
                    PlayerNumber::new(player % 3),
                    PlayerInput::from_bits(bits),
                    Frame::new(u32::from(frame)),
                );
            },
            ManagerOp::Simulate => manager.simulate_to_current_frame(),
            ManagerOp::Validate { frame } => {
                let _ = manager.validate_frame(Frame::new(u32::from(frame)));
            },
            ManagerOp::SpawnBall { x, y, vx, vy } => {
                manager.spawn_ball(
                    Vec2::new(f32::from(x) / 32.0, f32::from(y) / 32.0),
                    Vec2::new(f32::from(vx) / 16.0, f32::from(vy) / 16.0),
                );
            },
            ManagerOp::Destroy { entity } => {
                manager.destroy_entity(Entity::new(u32::from(entity % 16)));
            },
        }
        assert!(manager.last_validate_frame() >= validated);
        assert!(manager.last_validate_frame() <= manager.current_frame());
        assert!(manager.check_invariants().is_ok());
    }
});
