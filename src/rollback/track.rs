//! One full copy of the simulated world.

use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::ecs::{Component, ComponentTable, Entity, EntityManager};
use crate::gameplay::ball::{self, Concessions};
use crate::gameplay::{paddle, resolve_trigger, Ball, PlayerCharacter};
use crate::physics::{Body, BoxCollider, PhysicsManager, TriggerPairs};
use crate::telemetry::InvariantViolation;
use crate::PlayerInput;

/// Component kinds a [`SimulationTrack`] stores.
pub trait TrackComponent: Component {
    /// The track's table for this kind.
    fn table(track: &SimulationTrack) -> &ComponentTable<Self>;
    /// The track's table for this kind, mutably.
    fn table_mut(track: &mut SimulationTrack) -> &mut ComponentTable<Self>;
}

impl TrackComponent for Body {
    fn table(track: &SimulationTrack) -> &ComponentTable<Self> {
        track.physics.bodies()
    }

    fn table_mut(track: &mut SimulationTrack) -> &mut ComponentTable<Self> {
        track.physics.bodies_mut()
    }
}

impl TrackComponent for BoxCollider {
    fn table(track: &SimulationTrack) -> &ComponentTable<Self> {
        track.physics.boxes()
    }

    fn table_mut(track: &mut SimulationTrack) -> &mut ComponentTable<Self> {
        track.physics.boxes_mut()
    }
}

impl TrackComponent for Ball {
    fn table(track: &SimulationTrack) -> &ComponentTable<Self> {
        &track.balls
    }

    fn table_mut(track: &mut SimulationTrack) -> &mut ComponentTable<Self> {
        &mut track.balls
    }
}

impl TrackComponent for PlayerCharacter {
    fn table(track: &SimulationTrack) -> &ComponentTable<Self> {
        &track.players
    }

    fn table_mut(track: &mut SimulationTrack) -> &mut ComponentTable<Self> {
        &mut track.players
    }
}

/// What happened during one [`SimulationTrack::fixed_update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Players who lost a point.
    pub concessions: Concessions,
    /// Colliders that started overlapping.
    pub triggers: TriggerPairs,
    /// How many of those were a paddle hitting a ball.
    pub paddle_hits: usize,
}

/// Physics, ball and paddle state of one timeline.
///
/// The rollback manager keeps two of them: the speculative *current* track and the
/// *last-validated* track every node agrees on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationTrack {
    physics: PhysicsManager,
    balls: ComponentTable<Ball>,
    players: ComponentTable<PlayerCharacter>,
}

impl SimulationTrack {
    /// Creates an empty track.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The physics world.
    #[must_use]
    pub fn physics(&self) -> &PhysicsManager {
        &self.physics
    }

    /// Returns the entity's component of kind `C`.
    #[must_use]
    pub fn get<C: TrackComponent>(&self, entity: Entity) -> Option<&C> {
        C::table(self).get(entity)
    }

    /// The table of kind `C`.
    #[must_use]
    pub fn table<C: TrackComponent>(&self) -> &ComponentTable<C> {
        C::table(self)
    }

    /// Returns the entity's body.
    #[must_use]
    pub fn body(&self, entity: Entity) -> Option<&Body> {
        self.physics.body(entity)
    }

    /// Returns the entity's ball bookkeeping.
    #[must_use]
    pub fn ball(&self, entity: Entity) -> Option<&Ball> {
        self.balls.get(entity)
    }

    /// Returns the entity's player character.
    #[must_use]
    pub fn player_character(&self, entity: Entity) -> Option<&PlayerCharacter> {
        self.players.get(entity)
    }

    pub(crate) fn insert<C: TrackComponent>(&mut self, entity: Entity, value: C) {
        C::table_mut(self).set(entity, value);
    }

    /// Writes the input a paddle uses during the next step. Returns `false` if the entity has
    /// no player character on this track.
    pub(crate) fn set_player_input(&mut self, entity: Entity, input: PlayerInput) -> bool {
        match self.players.get_mut(entity) {
            Some(character) => {
                character.input = input;
                true
            },
            None => false,
        }
    }

    pub(crate) fn remove_entity(&mut self, entity: Entity) {
        self.physics.remove_entity(entity);
        self.balls.remove(entity);
        self.players.remove(entity);
    }

    /// Overwrites every table with the content of `other`.
    pub fn copy_from(&mut self, other: &SimulationTrack) {
        self.physics.copy_from(&other.physics);
        self.balls.copy_from(&other.balls);
        self.players.copy_from(&other.players);
    }

    /// Simulates one frame: ball rule, paddle rule, physics step, then trigger resolution for
    /// every new overlap.
    pub fn fixed_update(&mut self, config: &GameConfig) -> StepOutcome {
        let concessions =
            ball::fixed_update(&mut self.balls, &mut self.players, &mut self.physics, config);
        paddle::fixed_update(&mut self.players, &mut self.physics, config);
        let triggers = self.physics.fixed_update(config.fixed_period);

        let mut paddle_hits = 0;
        for pair in &triggers {
            if resolve_trigger(*pair, &self.players, &mut self.balls, &mut self.physics) {
                paddle_hits += 1;
            }
        }

        StepOutcome {
            concessions,
            triggers,
            paddle_hits,
        }
    }

    /// Checks that every table agrees with the registry in both directions.
    pub fn check_against(
        &self,
        registry: &EntityManager,
        name: &'static str,
    ) -> Result<(), InvariantViolation> {
        self.check_against_except(registry, name, |_| false)
    }

    /// Like [`check_against`](Self::check_against), but entities for which `absent_ok` returns
    /// `true` may be missing from this track.
    pub fn check_against_except(
        &self,
        registry: &EntityManager,
        name: &'static str,
        absent_ok: impl Fn(Entity) -> bool + Copy,
    ) -> Result<(), InvariantViolation> {
        check_table::<Body>(self, registry, name, absent_ok)?;
        check_table::<BoxCollider>(self, registry, name, absent_ok)?;
        check_table::<Ball>(self, registry, name, absent_ok)?;
        check_table::<PlayerCharacter>(self, registry, name, absent_ok)
    }
}

fn check_table<C: TrackComponent>(
    track: &SimulationTrack,
    registry: &EntityManager,
    name: &'static str,
    absent_ok: impl Fn(Entity) -> bool,
) -> Result<(), InvariantViolation> {
    let table = C::table(track);
    if let Some(entity) = table
        .entities()
        .find(|entity| !registry.has_component(*entity, C::MASK))
    {
        return Err(
            InvariantViolation::new(name, "component stored for an entity without its mask")
                .with_details(format!("entity={}, mask={:#x}", entity, C::MASK.bits())),
        );
    }
    if let Some(entity) = registry
        .entities_with(C::MASK)
        .find(|entity| !table.has(*entity) && !absent_ok(*entity))
    {
        return Err(
            InvariantViolation::new(name, "registry mask without a stored component")
                .with_details(format!("entity={}, mask={:#x}", entity, C::MASK.bits())),
        );
    }
    Ok(())
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
    use crate::ecs::EntityMask;
    use crate::PlayerNumber;
    use glam::Vec2;

    fn paddle_and_ball() -> (EntityManager, SimulationTrack, Entity, Entity) {
        let config = GameConfig::default();
        let mut registry = EntityManager::new();
        let mut track = SimulationTrack::new();

        let paddle = registry.create_entity();
        registry.add_component(
            paddle,
            EntityMask::BODY | EntityMask::BOX | EntityMask::PLAYER_CHARACTER,
        );
        track.insert(
            paddle,
            Body {
                position: Vec2::new(1.0, 0.0),
                velocity: Vec2::ZERO,
            },
        );
        track.insert(
            paddle,
            BoxCollider {
                extends: config.paddle_box_extents,
            },
        );
        track.insert(
            paddle,
            PlayerCharacter::new(PlayerNumber::new(0), config.player_health),
        );

        let ball = registry.create_entity();
        registry.add_component(ball, EntityMask::BODY | EntityMask::BOX | EntityMask::BALL);
        track.insert(
            ball,
            Body {
                position: Vec2::new(0.5, 0.0),
                velocity: Vec2::new(1.0, 1.0),
            },
        );
        track.insert(
            ball,
            BoxCollider {
                extends: config.ball_box_extents,
            },
        );
        track.insert(ball, Ball::default());
        (registry, track, paddle, ball)
    }

    #[test]
    fn paddle_hit_reflects_ball() {
        let config = GameConfig::default();
        let (_, mut track, _, ball) = paddle_and_ball();
        let outcome = track.fixed_update(&config);
        assert_eq!(outcome.paddle_hits, 1);
        assert!(outcome.concessions.is_empty());
        let body = track.body(ball).unwrap();
        assert_eq!(body.velocity, Vec2::new(-1.0, 1.0));
        assert_eq!(track.ball(ball).unwrap().last_hitter, PlayerNumber::new(0));
    }

    #[test]
    fn input_moves_paddle() {
        let config = GameConfig::default();
        let (_, mut track, paddle, _) = paddle_and_ball();
        assert!(track.set_player_input(paddle, PlayerInput::UP));
        track.fixed_update(&config);
        let body = track.body(paddle).unwrap();
        assert!(body.velocity.y > 0.0);
        assert!(body.position.y > 0.0);
    }

    #[test]
    fn input_for_non_paddle_is_refused() {
        let (_, mut track, _, ball) = paddle_and_ball();
        assert!(!track.set_player_input(ball, PlayerInput::UP));
    }

    #[test]
    fn copy_from_makes_tracks_equal() {
        let config = GameConfig::default();
        let (_, mut source, _, _) = paddle_and_ball();
        let mut target = SimulationTrack::new();
        source.fixed_update(&config);
        target.copy_from(&source);
        assert_eq!(target, source);

        source.fixed_update(&config);
        target.fixed_update(&config);
        assert_eq!(target, source);
    }

    #[test]
    fn consistent_track_passes_check() {
        let (registry, track, _, _) = paddle_and_ball();
        assert!(track.check_against(&registry, "track").is_ok());
        assert_eq!(track.table::<Body>().len(), 2);
        assert!(track.get::<Ball>(Entity::new(1)).is_some());
    }

    #[test]
    fn missing_component_fails_check() {
        let (registry, mut track, _, ball) = paddle_and_ball();
        track.balls.remove(ball);
        let err = track.check_against(&registry, "track").unwrap_err();
        assert!(err.to_string().contains("registry mask without a stored component"));
    }

    #[test]
    fn removed_entity_leaves_no_component() {
        let (mut registry, mut track, paddle, _) = paddle_and_ball();
        track.remove_entity(paddle);
        registry.destroy_entity(paddle);
        assert!(track.check_against(&registry, "track").is_ok());
        assert!(track.player_character(paddle).is_none());
    }
}
