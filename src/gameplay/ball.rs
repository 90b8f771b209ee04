//! Ball rule: scoring and wall bounces.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::GameConfig;
use crate::ecs::{Component, ComponentTable, EntityMask};
use crate::gameplay::PlayerCharacter;
use crate::physics::PhysicsManager;
use crate::PlayerNumber;

/// Bookkeeping attached to a ball. Its motion lives in the ball's [`Body`](crate::Body).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ball {
    /// Last player whose paddle touched the ball, [`PlayerNumber::INVALID`] after a reset.
    pub last_hitter: PlayerNumber,
    /// Paddle hits since the last reset.
    pub paddle_hits: u32,
}

impl Component for Ball {
    const MASK: EntityMask = EntityMask::BALL;
}

/// Players who conceded a point during one step.
pub type Concessions = SmallVec<[PlayerNumber; 2]>;

/// Applies the ball rule to every ball, in ascending id order.
///
/// A ball beyond the arena's horizontal extent goes back to the center with its vertical
/// velocity cleared and its horizontal velocity kept, and the player defending that side
/// loses one health point. A ball beyond the vertical extent has its vertical velocity turned
/// back toward the arena.
pub fn fixed_update(
    balls: &mut ComponentTable<Ball>,
    players: &mut ComponentTable<PlayerCharacter>,
    physics: &mut PhysicsManager,
    config: &GameConfig,
) -> Concessions {
    let arena = config.arena_extents;
    let mut conceded = Concessions::new();
    let entities: SmallVec<[_; 4]> = balls.entities().collect();

    for entity in entities {
        let Some(body) = physics.body_mut(entity) else {
            continue;
        };

        let losing_side = if body.position.x > arena.x {
            Some(config.right_side_player)
        } else if body.position.x < -arena.x {
            Some(config.left_side_player)
        } else {
            None
        };

        if let Some(player) = losing_side {
            body.position = Vec2::ZERO;
            body.velocity.y = 0.0;
            if let Some(ball) = balls.get_mut(entity) {
                ball.last_hitter = PlayerNumber::INVALID;
                ball.paddle_hits = 0;
            }
            concede_point(players, player, config);
            conceded.push(player);
            continue;
        }

        if body.position.y > arena.y {
            body.velocity.y = -body.velocity.y.abs();
        } else if body.position.y < -arena.y {
            body.velocity.y = body.velocity.y.abs();
        }
    }
    conceded
}

fn concede_point(
    players: &mut ComponentTable<PlayerCharacter>,
    player: PlayerNumber,
    config: &GameConfig,
) {
    let entities: SmallVec<[_; 2]> = players
        .iter()
        .filter(|(_, character)| character.player_number == player)
        .map(|(entity, _)| entity)
        .collect();
    for entity in entities {
        if let Some(character) = players.get_mut(entity) {
            character.health = character.health.saturating_sub(1).max(0);
            character.invincibility_time = config.invincibility_period;
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

    struct World {
        balls: ComponentTable<Ball>,
        players: ComponentTable<PlayerCharacter>,
        physics: PhysicsManager,
        config: GameConfig,
    }

    fn world(ball_position: Vec2, ball_velocity: Vec2) -> World {
        let config = GameConfig::default();
        let mut balls = ComponentTable::new();
        let mut players = ComponentTable::new();
        let mut physics = PhysicsManager::new();
        for number in 0..2u8 {
            let entity = Entity::new(u32::from(number));
            players.set(
                entity,
                PlayerCharacter::new(PlayerNumber::new(number), config.player_health),
            );
            physics.set_body(entity, Body::default());
        }
        balls.set(Entity::new(2), Ball::default());
        physics.set_body(
            Entity::new(2),
            Body {
                position: ball_position,
                velocity: ball_velocity,
            },
        );
        World {
            balls,
            players,
            physics,
            config,
        }
    }

    fn step(world: &mut World) -> Concessions {
        fixed_update(
            &mut world.balls,
            &mut world.players,
            &mut world.physics,
            &world.config,
        )
    }

    fn health(world: &World, player: u32) -> i16 {
        world.players.get(Entity::new(player)).unwrap().health
    }

    #[test]
    fn right_exit_scores_against_player_zero() {
        let mut world = world(Vec2::new(5.01, 1.0), Vec2::new(2.0, 1.5));
        let conceded = step(&mut world);
        assert_eq!(conceded.as_slice(), &[PlayerNumber::new(0)]);
        let body = world.physics.body(Entity::new(2)).unwrap();
        assert_eq!(body.position, Vec2::ZERO);
        assert_eq!(body.velocity, Vec2::new(2.0, 0.0));
        assert_eq!(health(&world, 0), 4);
        assert_eq!(health(&world, 1), 5);
    }

    #[test]
    fn left_exit_scores_against_player_one() {
        let mut world = world(Vec2::new(-5.5, 0.0), Vec2::new(-1.0, -1.0));
        step(&mut world);
        assert_eq!(health(&world, 0), 5);
        assert_eq!(health(&world, 1), 4);
        let player = world.players.get(Entity::new(1)).unwrap();
        assert_eq!(player.invincibility_time, world.config.invincibility_period);
    }

    #[test]
    fn exactly_on_bound_is_still_in_play() {
        let mut world = world(Vec2::new(5.0, 3.0), Vec2::new(1.0, 1.0));
        assert!(step(&mut world).is_empty());
        let body = world.physics.body(Entity::new(2)).unwrap();
        assert_eq!(body.velocity, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn top_wall_reflects_downward() {
        let mut world = world(Vec2::new(0.0, 3.1), Vec2::new(1.0, 1.0));
        step(&mut world);
        assert_eq!(
            world.physics.body(Entity::new(2)).unwrap().velocity,
            Vec2::new(1.0, -1.0)
        );
        // already heading back: stays downward
        step(&mut world);
        assert_eq!(
            world.physics.body(Entity::new(2)).unwrap().velocity,
            Vec2::new(1.0, -1.0)
        );
    }

    #[test]
    fn bottom_wall_reflects_upward() {
        let mut world = world(Vec2::new(0.0, -3.1), Vec2::new(-1.0, -0.5));
        step(&mut world);
        assert_eq!(
            world.physics.body(Entity::new(2)).unwrap().velocity,
            Vec2::new(-1.0, 0.5)
        );
    }

    #[test]
    fn health_never_goes_negative() {
        let mut world = world(Vec2::new(6.0, 0.0), Vec2::new(1.0, 0.0));
        world.players.get_mut(Entity::new(0)).unwrap().health = 0;
        step(&mut world);
        assert_eq!(health(&world, 0), 0);
    }

    #[test]
    fn reset_clears_bookkeeping() {
        let mut world = world(Vec2::new(6.0, 0.0), Vec2::new(1.0, 0.0));
        *world.balls.get_mut(Entity::new(2)).unwrap() = Ball {
            last_hitter: PlayerNumber::new(1),
            paddle_hits: 3,
        };
        step(&mut world);
        assert_eq!(world.balls.get(Entity::new(2)), Some(&Ball::default()));
    }
}
