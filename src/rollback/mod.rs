//! # Rollback Orchestrator
//!
//! The [`RollbackManager`] owns two [`SimulationTrack`]s and the input history that drives
//! them.
//!
//! ## How resimulation works
//!
//! ```text
//!                 last_validate_frame                 current_frame
//!                         │                                 │
//!  last-validated track ──┤                                 │
//!                         └─► copy ─► step ─► step ─► ... ─► current track ─► transforms
//!                                     ▲       ▲
//!                                     └───────┴── inputs from the history (real or predicted)
//! ```
//!
//! The current track is never advanced incrementally. Each presentation tick
//! ([`simulate_to_current_frame`]) rebuilds it from the last-validated track and replays every
//! frame since, so a late input only has to be written into the history to be taken into
//! account.
//!
//! Validation ([`validate_frame`]) replays up to the validated frame instead and promotes the
//! result to the last-validated track. It requires real input from every player for that frame.
//!
//! ## Provisional entities
//!
//! Entities spawned while the current frame is ahead of the last validated frame are
//! provisional: they are recorded as [`CreatedEntityRecord`]s together with their initial
//! components. Rebuilding the current track takes them off both tracks, and the replay writes
//! them back into the current track when it reaches their frame. Once validation passes that
//! frame they are part of the last-validated track like any other entity.
//!
//! ## Two-phase delete
//!
//! [`destroy_entity`] only sets the [`EntityMask::DESTROYED`] bit. Rebuilding the current track
//! clears every such bit and replays the destruction at its frame. Validation removes entities
//! whose bit is still set for good.
//!
//! [`simulate_to_current_frame`]: RollbackManager::simulate_to_current_frame
//! [`validate_frame`]: RollbackManager::validate_frame
//! [`destroy_entity`]: RollbackManager::destroy_entity

mod track;

pub use track::{SimulationTrack, StepOutcome, TrackComponent};

use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::checksum::PhysicsState;
use crate::config::GameConfig;
use crate::ecs::{Component, Entity, EntityManager, EntityMask};
use crate::error::{RollbackError, RollbackResult};
use crate::gameplay::{Ball, PlayerCharacter};
use crate::input_history::InputHistory;
use crate::physics::{Body, BoxCollider};
use crate::telemetry::{
    InvariantChecker, InvariantViolation, RuleViolation, ViolationKind, ViolationObserver,
    ViolationSeverity,
};
use crate::transform::{Transform, TransformManager};
use crate::{
    debug_check_invariants, report_violation_to, Frame, PlayerInput, PlayerNumber, MAX_PLAYERS,
};

/// An entity spawned while the simulation was ahead of validation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreatedEntityRecord {
    /// The spawned entity.
    pub entity: Entity,
    /// Frame at which it was spawned.
    pub created_frame: Frame,
}

/// Components a provisional ball is spawned with.
const PROVISIONAL_MASK: EntityMask = EntityMask::from_bits(
    EntityMask::BODY.bits()
        | EntityMask::BOX.bits()
        | EntityMask::BALL.bits()
        | EntityMask::TRANSFORM.bits(),
);

/// A provisional spawn and the components it is restored with.
#[derive(Debug, Copy, Clone)]
struct ProvisionalSpawn {
    record: CreatedEntityRecord,
    body: Body,
    collider: BoxCollider,
    ball: Ball,
    transform: Transform,
}

/// A soft delete waiting for validation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct DestroyedEntityRecord {
    entity: Entity,
    destroyed_frame: Frame,
}

/// Dual-track rollback simulation.
///
/// # Example
///
/// ```
/// use paddle_rollback::{Frame, GameConfig, PlayerInput, PlayerNumber, RollbackManager};
/// use glam::Vec2;
///
/// let mut rollback = RollbackManager::new(GameConfig::default()).unwrap();
/// let p0 = rollback.spawn_player(PlayerNumber::new(0), Vec2::new(1.0, 0.0), 0.0).unwrap();
/// rollback.spawn_player(PlayerNumber::new(1), Vec2::new(-1.0, 0.0), 180.0).unwrap();
///
/// // Player 0's input for frame 3 arrives: the current frame advances to 3.
/// rollback.set_player_input(PlayerNumber::new(0), PlayerInput::UP, Frame::new(3)).unwrap();
/// rollback.simulate_to_current_frame();
/// assert!(rollback.transforms().position(p0).unwrap().y > 0.0);
///
/// // Player 1 has not sent anything yet: frame 3 cannot be validated.
/// assert!(rollback.validate_frame(Frame::new(3)).is_err());
/// ```
pub struct RollbackManager {
    config: GameConfig,
    entities: EntityManager,
    current: SimulationTrack,
    last_validated: SimulationTrack,
    transforms: TransformManager,
    inputs: InputHistory,
    last_validate_frame: Frame,
    player_entities: [Entity; MAX_PLAYERS],
    created_entities: Vec<ProvisionalSpawn>,
    destroyed_entities: Vec<DestroyedEntityRecord>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for RollbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackManager")
            .field("current_frame", &self.current_frame())
            .field("last_validate_frame", &self.last_validate_frame)
            .field("entities", &self.entities.len())
            .field("player_entities", &self.player_entities)
            .field("created_entities", &self.created_entities.len())
            .finish_non_exhaustive()
    }
}

impl RollbackManager {
    /// Creates an empty simulation at frame 0.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: GameConfig) -> RollbackResult<Self> {
        config.validate()?;
        let inputs = InputHistory::with_length(config.input_history_length).ok_or_else(|| {
            RollbackError::InvalidConfig {
                info: format!(
                    "input history length {} is too small",
                    config.input_history_length
                ),
            }
        })?;
        Ok(Self {
            config,
            entities: EntityManager::new(),
            current: SimulationTrack::new(),
            last_validated: SimulationTrack::new(),
            transforms: TransformManager::new(),
            inputs,
            last_validate_frame: Frame::ZERO,
            player_entities: [Entity::INVALID; MAX_PLAYERS],
            created_entities: Vec::new(),
            destroyed_entities: Vec::new(),
            violation_observer: None,
        })
    }

    /// Routes violations to `observer` instead of the default tracing output.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// The installed violation observer, if any.
    #[must_use]
    pub fn violation_observer(&self) -> Option<&Arc<dyn ViolationObserver>> {
        self.violation_observer.as_ref()
    }

    // ==========================================
    // Queries
    // ==========================================

    /// The configuration the simulation runs with.
    #[must_use]
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Newest frame known to the simulation.
    #[must_use]
    pub fn current_frame(&self) -> Frame {
        self.inputs.current_frame()
    }

    /// Newest frame every node agrees on.
    #[must_use]
    pub fn last_validate_frame(&self) -> Frame {
        self.last_validate_frame
    }

    /// Newest frame for which `player`'s real input was received.
    #[must_use]
    pub fn last_received_frame(&self, player: PlayerNumber) -> Frame {
        self.inputs.last_received(player)
    }

    /// The speculative track, as of the last resimulation.
    #[must_use]
    pub fn current_track(&self) -> &SimulationTrack {
        &self.current
    }

    /// The track at [`last_validate_frame`](Self::last_validate_frame).
    #[must_use]
    pub fn last_validated_track(&self) -> &SimulationTrack {
        &self.last_validated
    }

    /// The presentation cache.
    #[must_use]
    pub fn transforms(&self) -> &TransformManager {
        &self.transforms
    }

    /// The entity registry shared by both tracks.
    #[must_use]
    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// The input history.
    #[must_use]
    pub fn input_history(&self) -> &InputHistory {
        &self.inputs
    }

    /// Spawn records validation has not caught up with yet, oldest first.
    pub fn created_entities(&self) -> impl ExactSizeIterator<Item = CreatedEntityRecord> + '_ {
        self.created_entities.iter().map(|spawn| spawn.record)
    }

    /// Returns `true` if `entity` was spawned after the last validated frame.
    #[must_use]
    pub fn is_provisional(&self, entity: Entity) -> bool {
        self.created_entities.iter().any(|spawn| {
            spawn.record.entity == entity
                && spawn.record.created_frame > self.last_validate_frame
        })
    }

    /// The entity controlled by `player`, if spawned.
    #[must_use]
    pub fn player_entity(&self, player: PlayerNumber) -> Option<Entity> {
        self.player_entities
            .get(player.as_usize())
            .copied()
            .filter(|entity| entity.is_valid())
    }

    /// Every player's entity, [`Entity::INVALID`] for players not spawned yet.
    #[must_use]
    pub fn player_entities(&self) -> [Entity; MAX_PLAYERS] {
        self.player_entities
    }

    /// Returns `true` while `entity` carries the soft-delete mark.
    #[must_use]
    pub fn is_destroyed(&self, entity: Entity) -> bool {
        self.entities.has_component(entity, EntityMask::DESTROYED)
    }

    /// Checksum of `player`'s body on the last-validated track. Players without an entity
    /// report [`PhysicsState::ZERO`].
    #[must_use]
    pub fn validated_physics_state(&self, player: PlayerNumber) -> PhysicsState {
        self.player_entity(player)
            .and_then(|entity| self.last_validated.body(entity))
            .map_or(PhysicsState::ZERO, PhysicsState::from_body)
    }

    /// Checksums of every player's validated body.
    #[must_use]
    pub fn validated_physics_states(&self) -> [PhysicsState; MAX_PLAYERS] {
        std::array::from_fn(|index| self.validated_physics_state(PlayerNumber::new(index as u8)))
    }

    // ==========================================
    // Input
    // ==========================================

    /// Moves the current frame forward to `new_frame`, predicting every player's input for
    /// the new frames from their newest input. Earlier frames are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::InvalidFrame`] if `new_frame` would leave the last validated
    /// frame outside the input history.
    pub fn start_new_frame(&mut self, new_frame: Frame) -> RollbackResult<()> {
        self.check_prediction_window(new_frame)?;
        self.inputs.start_new_frame(new_frame);
        Ok(())
    }

    /// Records `player`'s input for `frame`.
    ///
    /// A frame after the current frame advances it first (see
    /// [`start_new_frame`](Self::start_new_frame)). The first input to reach a frame also
    /// replaces the predictions for the frames skipped before it and for every later frame.
    ///
    /// # Errors
    ///
    /// - [`RollbackError::InvalidPlayerNumber`] for an unknown player.
    /// - [`RollbackError::InvalidFrame`] if `frame` is older than the input history, or so far
    ///   ahead that the last validated frame would fall out of it.
    pub fn set_player_input(
        &mut self,
        player: PlayerNumber,
        input: PlayerInput,
        frame: Frame,
    ) -> RollbackResult<()> {
        self.check_prediction_window(frame)?;
        if let Err(err) = self.inputs.set_input(player, input, frame) {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::InputHistory,
                "rejected input of player {} for frame {}: {}",
                player,
                frame,
                err
            );
            return Err(err);
        }
        trace!(%player, %frame, input = input.bits(), "input recorded");
        Ok(())
    }

    fn check_prediction_window(&self, frame: Frame) -> RollbackResult<()> {
        let ahead = frame.frames_since(self.last_validate_frame).unwrap_or(0) as usize;
        if ahead > self.inputs.len() {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::InputHistory,
                "frame {} is {} frames past the last validated frame {}, history holds {}",
                frame,
                ahead,
                self.last_validate_frame,
                self.inputs.len()
            );
            return Err(RollbackError::InvalidFrame {
                frame,
                reason: format!(
                    "more than {} frames ahead of the last validated frame {}",
                    self.inputs.len(),
                    self.last_validate_frame
                ),
            });
        }
        Ok(())
    }

    // ==========================================
    // Simulation
    // ==========================================

    /// Rebuilds the current track from the last-validated track, replays every frame up to the
    /// current frame and refreshes the presentation cache.
    pub fn simulate_to_current_frame(&mut self) {
        let from = self.last_validate_frame;
        let to = self.current_frame();
        self.rebuild_current_track();
        self.resimulate(from, to);
        self.push_transforms();
        debug_check_invariants!(self, "after simulate_to_current_frame");
    }

    /// Promotes `new_frame` to the last validated frame.
    ///
    /// Frames at or before the last validated frame are already validated and return `Ok`
    /// without doing anything.
    ///
    /// # Errors
    ///
    /// - [`RollbackError::InvalidFrame`] if `new_frame` is after the current frame.
    /// - [`RollbackError::IncompleteInput`] if a player's input for `new_frame` has not been
    ///   received. This is fatal for the match. State is left untouched.
    pub fn validate_frame(&mut self, new_frame: Frame) -> RollbackResult<()> {
        if new_frame <= self.last_validate_frame {
            debug!(
                "Frame {} already validated (last validated frame {})",
                new_frame, self.last_validate_frame
            );
            return Ok(());
        }
        let current_frame = self.current_frame();
        if new_frame > current_frame {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::FrameSync,
                "cannot validate frame {} past the current frame {}",
                new_frame,
                current_frame
            );
            return Err(RollbackError::InvalidFrame {
                frame: new_frame,
                reason: format!("the current frame is {}", current_frame),
            });
        }
        if let Some(player) = self.inputs.first_player_missing(new_frame) {
            let last_received = self.inputs.last_received(player);
            let violation = RuleViolation::new(
                ViolationSeverity::Critical,
                ViolationKind::FrameSync,
                format!(
                    "validating frame {} without input of player {} (last received {})",
                    new_frame, player, last_received
                ),
                concat!(file!(), ":", line!()),
            )
            .with_frame(new_frame)
            .with_context("player", player)
            .with_context("last_received", last_received);
            crate::telemetry::report_to_observer(self.violation_observer.as_ref(), &violation);
            return Err(RollbackError::IncompleteInput {
                frame: new_frame,
                player,
                last_received,
            });
        }

        let from = self.last_validate_frame;
        debug!("Validating frames {} to {}", from.next(), new_frame);
        self.rebuild_current_track();
        self.resimulate(from, new_frame);

        let destroyed: SmallVec<[Entity; 4]> =
            self.entities.entities_with(EntityMask::DESTROYED).collect();
        for entity in destroyed {
            debug!("Removing destroyed entity {} for good", entity);
            self.remove_permanently(entity);
        }
        self.destroyed_entities
            .retain(|record| record.destroyed_frame > new_frame);

        self.last_validated.copy_from(&self.current);
        self.last_validate_frame = new_frame;
        self.created_entities
            .retain(|spawn| spawn.record.created_frame > new_frame);
        // Deletes issued after the validated frame stay visible until the next rebuild.
        self.mark_destroyed(|destroyed_frame| destroyed_frame > new_frame);
        debug_check_invariants!(self, "after validate_frame");
        Ok(())
    }

    /// Validates `new_frame` and compares every player's validated body with the authoritative
    /// checksums.
    ///
    /// # Errors
    ///
    /// Everything [`validate_frame`](Self::validate_frame) returns, and
    /// [`RollbackError::Desync`] for the first player whose checksum differs. The local state
    /// is kept as is: desynchronization is reported, never corrected.
    pub fn confirm_frame(
        &mut self,
        new_frame: Frame,
        physics_states: &[PhysicsState; MAX_PLAYERS],
    ) -> RollbackResult<()> {
        if new_frame < self.last_validate_frame {
            debug!(
                "Ignoring confirmation of frame {}, already past it (last validated frame {})",
                new_frame, self.last_validate_frame
            );
            return Ok(());
        }
        self.validate_frame(new_frame)?;

        for player in PlayerNumber::all() {
            let local = self.validated_physics_state(player);
            let remote = physics_states
                .get(player.as_usize())
                .copied()
                .unwrap_or(PhysicsState::ZERO);
            if local != remote {
                let violation = RuleViolation::new(
                    ViolationSeverity::Critical,
                    ViolationKind::ChecksumMismatch,
                    format!(
                        "physics state of player {} differs from the authoritative one",
                        player
                    ),
                    concat!(file!(), ":", line!()),
                )
                .with_frame(new_frame)
                .with_context("player", player)
                .with_context("local", local)
                .with_context("remote", remote);
                crate::telemetry::report_to_observer(self.violation_observer.as_ref(), &violation);
                return Err(RollbackError::Desync {
                    frame: new_frame,
                    player,
                    local,
                    remote,
                });
            }
        }
        Ok(())
    }

    /// Takes provisional entities off both tracks, clears soft deletes and copies the
    /// last-validated track into the current track.
    fn rebuild_current_track(&mut self) {
        self.created_entities
            .retain(|spawn| spawn.record.created_frame > self.last_validate_frame);
        let provisional: SmallVec<[Entity; 4]> = self
            .created_entities
            .iter()
            .map(|spawn| spawn.record.entity)
            .collect();
        for entity in provisional {
            trace!("Withdrawing provisional entity {}", entity);
            self.current.remove_entity(entity);
            self.last_validated.remove_entity(entity);
            self.transforms.remove(entity);
            self.entities.remove_component(entity, PROVISIONAL_MASK);
        }

        let marked: SmallVec<[Entity; 4]> =
            self.entities.entities_with(EntityMask::DESTROYED).collect();
        for entity in marked {
            self.entities.remove_component(entity, EntityMask::DESTROYED);
        }

        self.current.copy_from(&self.last_validated);
    }

    /// Replays `(from, to]` on the current track.
    fn resimulate(&mut self, from: Frame, to: Frame) {
        self.mark_destroyed(|destroyed_frame| destroyed_frame <= from);
        for frame in from.range_after(to) {
            for player in PlayerNumber::all() {
                self.inject_input(player, frame);
            }
            let outcome = self.current.fixed_update(&self.config);
            if !outcome.concessions.is_empty() || outcome.paddle_hits > 0 {
                trace!(
                    %frame,
                    concessions = ?outcome.concessions,
                    paddle_hits = outcome.paddle_hits,
                    "simulated frame"
                );
            }
            self.restore_spawned(frame);
            self.mark_destroyed(|destroyed_frame| destroyed_frame == frame);
        }
    }

    /// Writes the provisional entities spawned at `frame` back into the current track.
    fn restore_spawned(&mut self, frame: Frame) {
        let due: SmallVec<[ProvisionalSpawn; 2]> = self
            .created_entities
            .iter()
            .filter(|spawn| spawn.record.created_frame == frame)
            .copied()
            .collect();
        for spawn in due {
            let entity = spawn.record.entity;
            trace!("Restoring provisional entity {} at frame {}", entity, frame);
            self.insert_on_current(entity, spawn.body);
            self.insert_on_current(entity, spawn.collider);
            self.insert_on_current(entity, spawn.ball);
            self.insert_transform(entity, spawn.transform);
        }
    }

    fn inject_input(&mut self, player: PlayerNumber, frame: Frame) {
        let input = match self.inputs.input(player, frame) {
            Ok(input) => input,
            Err(err) => {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Error,
                    ViolationKind::InputHistory,
                    "no input of player {} for frame {}: {}",
                    player,
                    frame,
                    err
                );
                return;
            },
        };
        let injected = self
            .player_entity(player)
            .is_some_and(|entity| self.current.set_player_input(entity, input));
        if !injected {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::EntityStore,
                "player {} has no paddle at frame {}, input skipped",
                player,
                frame
            );
        }
    }

    fn mark_destroyed(&mut self, due: impl Fn(Frame) -> bool) {
        for record in &self.destroyed_entities {
            if due(record.destroyed_frame) {
                self.entities
                    .add_component(record.entity, EntityMask::DESTROYED);
            }
        }
    }

    fn push_transforms(&mut self) {
        let entities: SmallVec<[Entity; 8]> = self
            .entities
            .entities_with(EntityMask::TRANSFORM)
            .collect();
        for entity in entities {
            let destroyed = self.is_destroyed(entity);
            self.transforms.set_hidden(entity, destroyed);
            if destroyed {
                continue;
            }
            if let Some(body) = self.current.body(entity) {
                self.transforms.set_position(entity, body.position);
            }
        }
    }

    // ==========================================
    // Spawning
    // ==========================================

    /// Spawns `player`'s paddle on both tracks and in the presentation cache.
    ///
    /// Spawning a player twice keeps the first paddle and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::InvalidPlayerNumber`] for an unknown player.
    pub fn spawn_player(
        &mut self,
        player: PlayerNumber,
        position: Vec2,
        rotation: f32,
    ) -> RollbackResult<Entity> {
        if !player.is_valid() {
            return Err(RollbackError::InvalidPlayerNumber {
                player,
                max: PlayerNumber::new((MAX_PLAYERS - 1) as u8),
            });
        }
        if let Some(existing) = self.player_entity(player) {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::EntityStore,
                "player {} already has paddle {}",
                player,
                existing
            );
            return Ok(existing);
        }

        let entity = self.entities.create_entity();
        self.insert_on_both_tracks(
            entity,
            Body {
                position,
                velocity: Vec2::ZERO,
            },
        );
        self.insert_on_both_tracks(
            entity,
            BoxCollider {
                extends: self.config.paddle_box_extents,
            },
        );
        self.insert_on_both_tracks(
            entity,
            PlayerCharacter::new(player, self.config.player_health),
        );
        self.insert_transform(
            entity,
            Transform {
                position,
                rotation,
                scale: self.config.player_scale,
            },
        );
        if let Some(slot) = self.player_entities.get_mut(player.as_usize()) {
            *slot = entity;
        }
        debug!("Spawned player {} as entity {}", player, entity);
        Ok(entity)
    }

    /// Spawns a ball on both tracks and in the presentation cache.
    ///
    /// A ball spawned while the current frame is ahead of the last validated frame is
    /// provisional: every rebuild replays it from the current frame, and validation reaching
    /// that frame makes it permanent.
    pub fn spawn_ball(&mut self, position: Vec2, velocity: Vec2) -> Entity {
        let entity = self.entities.create_entity();
        let created_frame = self.current_frame();
        let spawn = ProvisionalSpawn {
            record: CreatedEntityRecord {
                entity,
                created_frame,
            },
            body: Body { position, velocity },
            collider: BoxCollider {
                extends: self.config.ball_box_extents,
            },
            ball: Ball::default(),
            transform: Transform {
                position,
                rotation: 0.0,
                scale: self.config.ball_scale,
            },
        };
        self.insert_on_both_tracks(entity, spawn.body);
        self.insert_on_both_tracks(entity, spawn.collider);
        self.insert_on_both_tracks(entity, spawn.ball);
        self.insert_transform(entity, spawn.transform);
        self.created_entities.push(spawn);
        debug!("Spawned ball {} at frame {}", entity, created_frame);
        entity
    }

    /// Soft-deletes `entity` as of the current frame. The entity is removed for good when that
    /// frame is validated. Returns `false` for entities that are not alive or already deleted.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.entities.is_alive(entity)
            || self
                .destroyed_entities
                .iter()
                .any(|record| record.entity == entity)
        {
            return false;
        }
        self.entities.add_component(entity, EntityMask::DESTROYED);
        self.destroyed_entities.push(DestroyedEntityRecord {
            entity,
            destroyed_frame: self.current_frame(),
        });
        true
    }

    fn insert_on_both_tracks<C: TrackComponent>(&mut self, entity: Entity, value: C) {
        self.entities.add_component(entity, C::MASK);
        self.current.insert(entity, value.clone());
        self.last_validated.insert(entity, value);
    }

    fn insert_on_current<C: TrackComponent>(&mut self, entity: Entity, value: C) {
        self.entities.add_component(entity, C::MASK);
        self.current.insert(entity, value);
    }

    fn insert_transform(&mut self, entity: Entity, transform: Transform) {
        self.entities.add_component(entity, Transform::MASK);
        self.transforms.set(entity, transform);
    }

    fn remove_permanently(&mut self, entity: Entity) {
        self.entities.destroy_entity(entity);
        self.current.remove_entity(entity);
        self.last_validated.remove_entity(entity);
        self.transforms.remove(entity);
        self.created_entities
            .retain(|spawn| spawn.record.entity != entity);
        self.destroyed_entities.retain(|record| record.entity != entity);
        for slot in &mut self.player_entities {
            if *slot == entity {
                *slot = Entity::INVALID;
            }
        }
    }
}

impl InvariantChecker for RollbackManager {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.last_validate_frame > self.current_frame() {
            return Err(InvariantViolation::new(
                "RollbackManager",
                "last validated frame is after the current frame",
            )
            .with_details(format!(
                "last_validate_frame={}, current_frame={}",
                self.last_validate_frame,
                self.current_frame()
            )));
        }
        self.inputs.check_invariants()?;
        self.current.check_against(&self.entities, "current track")?;
        // The replay may have restored provisional entities the validated track cannot hold yet.
        self.last_validated.check_against_except(
            &self.entities,
            "last-validated track",
            |entity| self.is_provisional(entity),
        )?;
        for (index, entity) in self.player_entities.iter().enumerate() {
            if entity.is_valid()
                && !self
                    .entities
                    .has_component(*entity, PlayerCharacter::MASK)
            {
                return Err(InvariantViolation::new(
                    "RollbackManager",
                    "player mapped to an entity without a paddle",
                )
                .with_details(format!("player={}, entity={}", index, entity)));
            }
        }
        Ok(())
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
    use crate::telemetry::CollectingObserver;

    const P0: PlayerNumber = PlayerNumber::new(0);
    const P1: PlayerNumber = PlayerNumber::new(1);

    fn manager() -> RollbackManager {
        let mut manager = RollbackManager::new(GameConfig::default()).unwrap();
        manager.spawn_player(P0, Vec2::new(1.0, 0.0), 0.0).unwrap();
        manager.spawn_player(P1, Vec2::new(-1.0, 0.0), 180.0).unwrap();
        manager
    }

    fn feed(
        manager: &mut RollbackManager,
        player: PlayerNumber,
        frames: std::ops::RangeInclusive<u32>,
        input: PlayerInput,
    ) {
        for frame in frames {
            manager
                .set_player_input(player, input, Frame::new(frame))
                .unwrap();
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = GameConfig {
            input_history_length: 0,
            ..GameConfig::default()
        };
        assert!(matches!(
            RollbackManager::new(config),
            Err(RollbackError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn spawn_writes_both_tracks_and_transforms() {
        let manager = manager();
        let entity = manager.player_entity(P1).unwrap();
        assert_eq!(
            manager.current_track().body(entity),
            manager.last_validated_track().body(entity)
        );
        assert_eq!(manager.transforms().rotation(entity), Some(180.0));
        assert_eq!(
            manager.transforms().scale(entity),
            Some(manager.config().player_scale)
        );
        assert!(manager.check_invariants().is_ok());
    }

    #[test]
    fn spawning_twice_keeps_first_paddle() {
        let mut manager = manager();
        let first = manager.player_entity(P0).unwrap();
        let again = manager.spawn_player(P0, Vec2::ZERO, 0.0).unwrap();
        assert_eq!(first, again);
        assert_eq!(manager.entities().len(), 2);
    }

    #[test]
    fn spawn_rejects_unknown_player() {
        let mut manager = manager();
        assert!(matches!(
            manager.spawn_player(PlayerNumber::new(2), Vec2::ZERO, 0.0),
            Err(RollbackError::InvalidPlayerNumber { .. })
        ));
    }

    #[test]
    fn simulation_leaves_validated_track_alone() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=5, PlayerInput::UP);
        manager.simulate_to_current_frame();
        let entity = manager.player_entity(P0).unwrap();
        assert!(manager.current_track().body(entity).unwrap().position.y > 0.0);
        assert_eq!(
            manager.last_validated_track().body(entity).unwrap().position,
            Vec2::new(1.0, 0.0)
        );
        assert_eq!(
            manager.transforms().position(entity),
            Some(manager.current_track().body(entity).unwrap().position)
        );
    }

    #[test]
    fn validation_requires_every_player() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=5, PlayerInput::UP);
        feed(&mut manager, P1, 1..=3, PlayerInput::DOWN);
        let err = manager.validate_frame(Frame::new(5)).unwrap_err();
        assert_eq!(
            err,
            RollbackError::IncompleteInput {
                frame: Frame::new(5),
                player: P1,
                last_received: Frame::new(3),
            }
        );
        assert_eq!(manager.last_validate_frame(), Frame::ZERO);
        manager.validate_frame(Frame::new(3)).unwrap();
        assert_eq!(manager.last_validate_frame(), Frame::new(3));
    }

    #[test]
    fn validation_is_monotonic() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=6, PlayerInput::UP);
        feed(&mut manager, P1, 1..=6, PlayerInput::UP);
        manager.validate_frame(Frame::new(4)).unwrap();
        let validated = manager.last_validated_track().clone();
        manager.validate_frame(Frame::new(2)).unwrap();
        assert_eq!(manager.last_validate_frame(), Frame::new(4));
        assert_eq!(manager.last_validated_track(), &validated);
    }

    #[test]
    fn cannot_validate_the_future() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=2, PlayerInput::UP);
        assert!(matches!(
            manager.validate_frame(Frame::new(3)),
            Err(RollbackError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn validated_track_matches_resimulated_current() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=8, PlayerInput::UP);
        feed(&mut manager, P1, 1..=8, PlayerInput::DOWN);
        manager.simulate_to_current_frame();
        let speculative = manager.current_track().clone();
        manager.validate_frame(Frame::new(8)).unwrap();
        assert_eq!(manager.last_validated_track(), &speculative);
    }

    #[test]
    fn late_input_changes_the_replay() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=4, PlayerInput::NONE);
        manager.simulate_to_current_frame();
        let entity = manager.player_entity(P1).unwrap();
        assert_eq!(manager.current_track().body(entity).unwrap().velocity, Vec2::ZERO);

        // P1's first input, for frame 1, is predicted onto frames 2..=4 as well.
        manager
            .set_player_input(P1, PlayerInput::UP, Frame::new(1))
            .unwrap();
        manager.simulate_to_current_frame();
        let velocity = manager.current_track().body(entity).unwrap().velocity;
        assert!(velocity.y > 0.0);
    }

    #[test]
    fn confirm_detects_desync_without_overwriting() {
        let observer = Arc::new(CollectingObserver::new());
        let mut manager = manager().with_observer(observer.clone());
        feed(&mut manager, P0, 1..=3, PlayerInput::UP);
        feed(&mut manager, P1, 1..=3, PlayerInput::UP);

        let mut states = [PhysicsState::ZERO; MAX_PLAYERS];
        states[1] = PhysicsState::new(12345);
        let err = manager.confirm_frame(Frame::new(3), &states).unwrap_err();
        assert!(matches!(err, RollbackError::Desync { player, .. } if player == P0));
        assert!(err.is_fatal());
        assert!(observer.has_violation(ViolationKind::ChecksumMismatch));
        assert_eq!(manager.last_validate_frame(), Frame::new(3));
        assert_ne!(manager.validated_physics_state(P1), PhysicsState::new(12345));
    }

    #[test]
    fn confirm_accepts_matching_states() {
        let mut server = manager();
        let mut client = manager();
        for node in [&mut server, &mut client] {
            feed(node, P0, 1..=5, PlayerInput::UP);
            feed(node, P1, 1..=5, PlayerInput::DOWN);
        }
        server.validate_frame(Frame::new(5)).unwrap();
        let states = server.validated_physics_states();
        client.confirm_frame(Frame::new(5), &states).unwrap();
        assert_eq!(client.last_validated_track(), server.last_validated_track());
    }

    #[test]
    fn provisional_ball_is_withdrawn_on_rebuild() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=4, PlayerInput::NONE);
        let ball = manager.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.0));
        assert_eq!(manager.created_entities().len(), 1);
        assert!(manager.is_provisional(ball));

        manager.simulate_to_current_frame();
        // Replayed from frame 4, so it is on the current track only.
        assert!(manager.current_track().ball(ball).is_some());
        assert!(manager.last_validated_track().body(ball).is_none());
        assert_eq!(manager.transforms().position(ball), Some(Vec2::ZERO));
        assert_eq!(manager.created_entities().len(), 1);
        assert!(manager.check_invariants().is_ok());
    }

    #[test]
    fn provisional_ball_is_absent_before_its_frame() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=4, PlayerInput::NONE);
        feed(&mut manager, P1, 1..=4, PlayerInput::NONE);
        let ball = manager.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.0));

        manager.validate_frame(Frame::new(3)).unwrap();
        assert!(manager.current_track().body(ball).is_none());
        assert!(manager.last_validated_track().body(ball).is_none());
        assert!(manager.transforms().get(ball).is_none());
        assert!(manager.entities().is_alive(ball));
        assert!(manager.is_provisional(ball));
        assert!(manager.check_invariants().is_ok());
    }

    #[test]
    fn provisional_ball_is_promoted_by_validation() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=4, PlayerInput::NONE);
        feed(&mut manager, P1, 1..=4, PlayerInput::NONE);
        let ball = manager.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.0));
        manager.validate_frame(Frame::new(4)).unwrap();
        assert_eq!(manager.created_entities().len(), 0);
        assert!(manager.last_validated_track().ball(ball).is_some());
        manager.simulate_to_current_frame();
        assert!(manager.entities().is_alive(ball));
    }

    #[test]
    fn provisional_ball_survives_ticks_until_promoted() {
        let mut manager = manager();
        feed(&mut manager, P0, 1..=4, PlayerInput::NONE);
        feed(&mut manager, P1, 1..=4, PlayerInput::NONE);
        let ball = manager.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.0));
        manager.simulate_to_current_frame();

        feed(&mut manager, P0, 5..=6, PlayerInput::NONE);
        feed(&mut manager, P1, 5..=6, PlayerInput::NONE);
        manager.simulate_to_current_frame();
        let speculative = *manager.current_track().body(ball).unwrap();
        // Two steps of 1.0 * fixed_period from the spawn position.
        assert_eq!(
            speculative.position,
            Vec2::new(2.0 * manager.config().fixed_period, 0.0)
        );

        manager.validate_frame(Frame::new(6)).unwrap();
        manager.simulate_to_current_frame();
        assert!(manager.entities().is_alive(ball));
        assert!(!manager.is_provisional(ball));
        assert_eq!(manager.last_validated_track().body(ball), Some(&speculative));
        assert_eq!(manager.current_track().body(ball), Some(&speculative));
        assert!(manager.check_invariants().is_ok());
    }

    #[test]
    fn destruction_is_undone_by_rebuild_and_final_at_validation() {
        let mut manager = manager();
        let ball = manager.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.0));
        feed(&mut manager, P0, 1..=2, PlayerInput::NONE);
        feed(&mut manager, P1, 1..=2, PlayerInput::NONE);

        assert!(manager.destroy_entity(ball));
        assert!(manager.is_destroyed(ball));
        manager.simulate_to_current_frame();
        // replayed at frame 2
        assert!(manager.is_destroyed(ball));
        assert!(manager.entities().is_alive(ball));

        manager.validate_frame(Frame::new(1)).unwrap();
        assert!(manager.entities().is_alive(ball));
        assert!(!manager.is_destroyed(ball));

        manager.validate_frame(Frame::new(2)).unwrap();
        assert!(!manager.entities().is_alive(ball));
        assert!(manager.last_validated_track().body(ball).is_none());
        assert!(manager.check_invariants().is_ok());
    }

    #[test]
    fn later_delete_stays_marked_after_validation() {
        let mut manager = manager();
        let ball = manager.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.0));
        feed(&mut manager, P0, 1..=3, PlayerInput::NONE);
        feed(&mut manager, P1, 1..=3, PlayerInput::NONE);
        assert!(manager.destroy_entity(ball));

        manager.validate_frame(Frame::new(1)).unwrap();
        assert!(manager.is_destroyed(ball));
        assert!(!manager.destroy_entity(ball));

        manager.validate_frame(Frame::new(3)).unwrap();
        assert!(!manager.entities().is_alive(ball));
    }

    #[test]
    fn destroyed_entity_is_hidden_from_presentation() {
        let mut manager = manager();
        let ball = manager.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.0));
        feed(&mut manager, P0, 1..=2, PlayerInput::NONE);
        manager.simulate_to_current_frame();
        assert!(!manager.transforms().is_hidden(ball));

        assert!(manager.destroy_entity(ball));
        manager.simulate_to_current_frame();
        assert!(manager.transforms().is_hidden(ball));
        assert!(manager.transforms().visible().all(|(entity, _)| entity != ball));
        assert_eq!(manager.transforms().visible().count(), 2);
    }

    #[test]
    fn input_too_far_ahead_is_rejected() {
        let mut manager = RollbackManager::new(GameConfig::minimal()).unwrap();
        let length = manager.input_history().len() as u32;
        assert!(manager
            .set_player_input(P0, PlayerInput::UP, Frame::new(length))
            .is_ok());
        assert!(matches!(
            manager.set_player_input(P0, PlayerInput::UP, Frame::new(length + 1)),
            Err(RollbackError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn missing_paddle_is_reported_and_skipped() {
        let observer = Arc::new(CollectingObserver::new());
        let mut manager = RollbackManager::new(GameConfig::default())
            .unwrap()
            .with_observer(observer.clone());
        manager.spawn_player(P0, Vec2::ZERO, 0.0).unwrap();
        feed(&mut manager, P0, 1..=1, PlayerInput::UP);
        manager.simulate_to_current_frame();
        let warnings = observer.violations_of_kind(ViolationKind::EntityStore);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, ViolationSeverity::Warning);
    }
}
