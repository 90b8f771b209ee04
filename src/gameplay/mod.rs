//! Deterministic gameplay rules.
//!
//! Each rule is a plain function over one track's component tables. A simulation step runs
//! [`ball::fixed_update`], then [`paddle::fixed_update`], then the physics step, then
//! [`resolve_trigger`] for every pair the physics step reported.

pub mod ball;
pub mod paddle;

pub use ball::Ball;
pub use paddle::PlayerCharacter;

use crate::ecs::{ComponentTable, Entity};
use crate::physics::{PhysicsManager, TriggerPair};

/// Resolves an overlap between a paddle and a ball.
///
/// Even players send the ball toward negative x, odd players toward positive x. Only the sign
/// of the horizontal velocity changes. Pairs that are not paddle/ball return `false` and
/// change nothing.
pub fn resolve_trigger(
    pair: TriggerPair,
    players: &ComponentTable<PlayerCharacter>,
    balls: &mut ComponentTable<Ball>,
    physics: &mut PhysicsManager,
) -> bool {
    let Some((player_entity, ball_entity)) = paddle_and_ball(pair, players, balls) else {
        return false;
    };
    let Some(player) = players.get(player_entity) else {
        return false;
    };
    let Some(body) = physics.body_mut(ball_entity) else {
        return false;
    };

    let speed = body.velocity.x.abs();
    body.velocity.x = if player.player_number.is_even() {
        -speed
    } else {
        speed
    };

    if let Some(ball) = balls.get_mut(ball_entity) {
        ball.last_hitter = player.player_number;
        ball.paddle_hits = ball.paddle_hits.saturating_add(1);
    }
    true
}

fn paddle_and_ball(
    pair: TriggerPair,
    players: &ComponentTable<PlayerCharacter>,
    balls: &ComponentTable<Ball>,
) -> Option<(Entity, Entity)> {
    let TriggerPair { first, second } = pair;
    if players.has(first) && balls.has(second) {
        Some((first, second))
    } else if players.has(second) && balls.has(first) {
        Some((second, first))
    } else {
        None
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
    use crate::physics::Body;
    use crate::PlayerNumber;
    use glam::Vec2;

    fn setup(player: u8, ball_velocity: Vec2) -> (
        ComponentTable<PlayerCharacter>,
        ComponentTable<Ball>,
        PhysicsManager,
    ) {
        let mut players = ComponentTable::new();
        let mut balls = ComponentTable::new();
        let mut physics = PhysicsManager::new();
        players.set(
            Entity::new(0),
            PlayerCharacter::new(PlayerNumber::new(player), 5),
        );
        physics.set_body(Entity::new(0), Body::default());
        balls.set(Entity::new(1), Ball::default());
        physics.set_body(
            Entity::new(1),
            Body {
                position: Vec2::ZERO,
                velocity: ball_velocity,
            },
        );
        (players, balls, physics)
    }

    #[test]
    fn even_player_sends_ball_left() {
        let (players, mut balls, mut physics) = setup(0, Vec2::new(1.0, 0.5));
        let pair = TriggerPair::new(Entity::new(0), Entity::new(1));
        assert!(resolve_trigger(pair, &players, &mut balls, &mut physics));
        assert_eq!(
            physics.body(Entity::new(1)).unwrap().velocity,
            Vec2::new(-1.0, 0.5)
        );
        let ball = balls.get(Entity::new(1)).unwrap();
        assert_eq!(ball.last_hitter, PlayerNumber::new(0));
        assert_eq!(ball.paddle_hits, 1);
    }

    #[test]
    fn odd_player_sends_ball_right() {
        let (players, mut balls, mut physics) = setup(1, Vec2::new(-2.0, -0.5));
        let pair = TriggerPair::new(Entity::new(1), Entity::new(0));
        assert!(resolve_trigger(pair, &players, &mut balls, &mut physics));
        assert_eq!(
            physics.body(Entity::new(1)).unwrap().velocity,
            Vec2::new(2.0, -0.5)
        );
    }

    #[test]
    fn reflection_is_idempotent() {
        let (players, mut balls, mut physics) = setup(0, Vec2::new(-1.0, 0.0));
        let pair = TriggerPair::new(Entity::new(0), Entity::new(1));
        resolve_trigger(pair, &players, &mut balls, &mut physics);
        assert_eq!(
            physics.body(Entity::new(1)).unwrap().velocity,
            Vec2::new(-1.0, 0.0)
        );
    }

    #[test]
    fn non_paddle_pairs_are_ignored() {
        let (players, mut balls, mut physics) = setup(0, Vec2::new(1.0, 0.0));
        balls.set(Entity::new(2), Ball::default());
        physics.set_body(Entity::new(2), Body::default());
        let pair = TriggerPair::new(Entity::new(1), Entity::new(2));
        assert!(!resolve_trigger(pair, &players, &mut balls, &mut physics));
        assert_eq!(
            physics.body(Entity::new(1)).unwrap().velocity,
            Vec2::new(1.0, 0.0)
        );
    }
}
