//! Paddle rule: input driven vertical movement.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::GameConfig;
use crate::ecs::{Component, ComponentTable, EntityMask};
use crate::physics::PhysicsManager;
use crate::{PlayerInput, PlayerNumber};

/// A player's paddle.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCharacter {
    /// Input applied during the frame being simulated.
    pub input: PlayerInput,
    /// Owner of the paddle.
    pub player_number: PlayerNumber,
    /// Remaining points. The player has lost at 0.
    pub health: i16,
    /// Seconds of invincibility left, never negative.
    pub invincibility_time: f32,
}

impl PlayerCharacter {
    /// Creates a paddle for `player_number` with no input and no invincibility.
    #[must_use]
    pub const fn new(player_number: PlayerNumber, health: i16) -> Self {
        Self {
            input: PlayerInput::NONE,
            player_number,
            health,
            invincibility_time: 0.0,
        }
    }
}

impl Default for PlayerCharacter {
    fn default() -> Self {
        Self::new(PlayerNumber::INVALID, 0)
    }
}

impl Component for PlayerCharacter {
    const MASK: EntityMask = EntityMask::PLAYER_CHARACTER;
}

/// Applies the paddle rule to every player character, in ascending id order.
///
/// The vertical intent of the input accelerates the paddle's body. A paddle past the vertical
/// bound that keeps moving outward is stopped.
pub fn fixed_update(
    players: &mut ComponentTable<PlayerCharacter>,
    physics: &mut PhysicsManager,
    config: &GameConfig,
) {
    let dt = config.fixed_period;
    let bound = config.paddle_bound();
    let entities: SmallVec<[_; 2]> = players.entities().collect();

    for entity in entities {
        let Some(character) = players.get_mut(entity) else {
            continue;
        };
        if character.invincibility_time > 0.0 {
            character.invincibility_time = (character.invincibility_time - dt).max(0.0);
        }

        let Some(body) = physics.body_mut(entity) else {
            continue;
        };
        let acceleration = character.input.vertical_intent() * config.paddle_acceleration;
        body.velocity.y += acceleration * dt;

        let escaping_up = body.position.y > bound && body.velocity.y > 0.0;
        let escaping_down = body.position.y < -bound && body.velocity.y < 0.0;
        if escaping_up || escaping_down {
            body.velocity = Vec2::ZERO;
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use crate::ecs::Entity;
    use crate::physics::Body;

    fn paddle(position: Vec2, velocity: Vec2, input: PlayerInput) -> (
        ComponentTable<PlayerCharacter>,
        PhysicsManager,
    ) {
        let mut players = ComponentTable::new();
        let mut character = PlayerCharacter::new(PlayerNumber::new(0), 5);
        character.input = input;
        players.set(Entity::new(0), character);
        let mut physics = PhysicsManager::new();
        physics.set_body(Entity::new(0), Body { position, velocity });
        (players, physics)
    }

    fn velocity(physics: &PhysicsManager) -> Vec2 {
        physics.body(Entity::new(0)).unwrap().velocity
    }

    #[test]
    fn up_accelerates_upward() {
        let config = GameConfig::default();
        let (mut players, mut physics) = paddle(Vec2::ZERO, Vec2::ZERO, PlayerInput::UP);
        fixed_update(&mut players, &mut physics, &config);
        assert_eq!(velocity(&physics), Vec2::new(0.0, config.fixed_period));
    }

    #[test]
    fn down_accelerates_downward() {
        let config = GameConfig::default();
        let (mut players, mut physics) = paddle(Vec2::ZERO, Vec2::ZERO, PlayerInput::DOWN);
        fixed_update(&mut players, &mut physics, &config);
        assert_eq!(velocity(&physics), Vec2::new(0.0, -config.fixed_period));
    }

    #[test]
    fn both_directions_cancel_out() {
        let config = GameConfig::default();
        let (mut players, mut physics) =
            paddle(Vec2::ZERO, Vec2::new(0.0, 0.5), PlayerInput::UP | PlayerInput::DOWN);
        fixed_update(&mut players, &mut physics, &config);
        assert_eq!(velocity(&physics), Vec2::new(0.0, 0.5));
    }

    #[test]
    fn stops_past_upper_bound_when_moving_out() {
        let config = GameConfig::default();
        let (mut players, mut physics) =
            paddle(Vec2::new(1.0, 3.2), Vec2::new(0.0, 0.5), PlayerInput::UP);
        fixed_update(&mut players, &mut physics, &config);
        assert_eq!(velocity(&physics), Vec2::ZERO);
    }

    #[test]
    fn may_move_back_from_upper_bound() {
        let config = GameConfig::default();
        let (mut players, mut physics) =
            paddle(Vec2::new(1.0, 3.2), Vec2::new(0.0, -0.5), PlayerInput::NONE);
        fixed_update(&mut players, &mut physics, &config);
        assert_eq!(velocity(&physics), Vec2::new(0.0, -0.5));
    }

    #[test]
    fn stops_past_lower_bound_when_moving_out() {
        let config = GameConfig::default();
        let (mut players, mut physics) =
            paddle(Vec2::new(1.0, -3.2), Vec2::new(0.0, -0.1), PlayerInput::NONE);
        fixed_update(&mut players, &mut physics, &config);
        assert_eq!(velocity(&physics), Vec2::ZERO);
    }

    #[test]
    fn invincibility_counts_down_to_zero() {
        let config = GameConfig::default();
        let (mut players, mut physics) = paddle(Vec2::ZERO, Vec2::ZERO, PlayerInput::NONE);
        players.get_mut(Entity::new(0)).unwrap().invincibility_time = 0.03;
        fixed_update(&mut players, &mut physics, &config);
        let remaining = players.get(Entity::new(0)).unwrap().invincibility_time;
        assert!(remaining > 0.0 && remaining < 0.03);
        fixed_update(&mut players, &mut physics, &config);
        assert_eq!(players.get(Entity::new(0)).unwrap().invincibility_time, 0.0);
        fixed_update(&mut players, &mut physics, &config);
        assert_eq!(players.get(Entity::new(0)).unwrap().invincibility_time, 0.0);
    }
}
