//! The game shell shared by the server and the clients.
//!
//! [`GameManager`] wraps a [`RollbackManager`] with the operations a game loop and a network
//! layer need: spawning, feeding input (directly or from [`PlayerInputPacket`]s), ticking,
//! validating on the server and checking [`FrameConfirmation`]s on the clients.
//!
//! # Server flow
//!
//! ```
//! use paddle_rollback::{Frame, GameConfig, GameManager, PlayerInput, PlayerInputPacket, PlayerNumber};
//!
//! let mut server = GameManager::new(GameConfig::default()).unwrap();
//! server.spawn_default_players().unwrap();
//!
//! for player in PlayerNumber::all() {
//!     let packet = PlayerInputPacket::new(player, Frame::new(2), vec![PlayerInput::UP; 3]);
//!     server.receive_input(&packet).unwrap();
//! }
//! let confirmation = server.validate(Frame::new(2)).unwrap();
//! assert_eq!(confirmation.frame, 2);
//! ```
//!
//! # Client flow
//!
//! A client feeds its own input with [`GameManager::set_player_input`], the remote player's
//! input with [`GameManager::receive_input`], calls [`GameManager::tick`] once per rendered
//! frame and hands every confirmation to [`GameManager::receive_confirmation`].

use std::sync::Arc;

use glam::Vec2;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::ecs::Entity;
use crate::error::{RollbackError, RollbackResult};
use crate::network::messages::{FrameConfirmation, PlayerInputPacket};
use crate::rollback::RollbackManager;
use crate::telemetry::ViolationObserver;
use crate::transform::TransformManager;
use crate::{Frame, PlayerInput, PlayerNumber, MAX_PLAYERS};

/// Spawn, input and validation surface over a [`RollbackManager`].
#[derive(Debug)]
pub struct GameManager {
    rollback: RollbackManager,
    winner: Option<PlayerNumber>,
}

impl GameManager {
    /// Creates an empty game.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: GameConfig) -> RollbackResult<Self> {
        Ok(Self {
            rollback: RollbackManager::new(config)?,
            winner: None,
        })
    }

    /// Routes violations to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.rollback = self.rollback.with_observer(observer);
        self
    }

    /// Spawns `player`'s paddle.
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
        self.rollback.spawn_player(player, position, rotation)
    }

    /// Spawns every player at its configured position and rotation.
    ///
    /// # Errors
    ///
    /// Propagates [`spawn_player`](Self::spawn_player) errors.
    pub fn spawn_default_players(&mut self) -> RollbackResult<[Entity; MAX_PLAYERS]> {
        let config = *self.rollback.config();
        for player in PlayerNumber::all() {
            let index = player.as_usize();
            self.rollback.spawn_player(
                player,
                config.spawn_positions[index],
                config.spawn_rotations[index],
            )?;
        }
        Ok(self.rollback.player_entities())
    }

    /// Spawns a ball. A ball spawned ahead of the last validated frame is replayed from the
    /// current frame until validation reaches it.
    pub fn spawn_ball(&mut self, position: Vec2, velocity: Vec2) -> Entity {
        self.rollback.spawn_ball(position, velocity)
    }

    /// Soft-deletes `entity`. See [`RollbackManager::destroy_entity`].
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        self.rollback.destroy_entity(entity)
    }

    /// The paddle of `player`, [`Entity::INVALID`] if not spawned.
    #[must_use]
    pub fn entity_from_player_number(&self, player: PlayerNumber) -> Entity {
        self.rollback.player_entity(player).unwrap_or(Entity::INVALID)
    }

    /// The player ↔ entity map.
    #[must_use]
    pub fn player_entities(&self) -> [Entity; MAX_PLAYERS] {
        self.rollback.player_entities()
    }

    /// Newest frame known to the simulation.
    #[must_use]
    pub fn current_frame(&self) -> Frame {
        self.rollback.current_frame()
    }

    /// Newest validated frame.
    #[must_use]
    pub fn last_validate_frame(&self) -> Frame {
        self.rollback.last_validate_frame()
    }

    /// The underlying rollback manager.
    #[must_use]
    pub fn rollback(&self) -> &RollbackManager {
        &self.rollback
    }

    /// Positions to render, as of the last [`tick`](Self::tick).
    #[must_use]
    pub fn transforms(&self) -> &TransformManager {
        self.rollback.transforms()
    }

    /// The configuration the game runs with.
    #[must_use]
    pub fn config(&self) -> &GameConfig {
        self.rollback.config()
    }

    /// Records `player`'s input for `frame`.
    ///
    /// # Errors
    ///
    /// See [`RollbackManager::set_player_input`].
    pub fn set_player_input(
        &mut self,
        player: PlayerNumber,
        input: PlayerInput,
        frame: Frame,
    ) -> RollbackResult<()> {
        self.rollback.set_player_input(player, input, frame)
    }

    /// Records every input of `packet` the history does not hold yet, oldest first.
    ///
    /// # Errors
    ///
    /// Stops at the first input the history rejects.
    pub fn receive_input(&mut self, packet: &PlayerInputPacket) -> RollbackResult<()> {
        let last_received = self.rollback.last_received_frame(packet.player);
        for (frame, input) in packet.frames() {
            if frame <= last_received {
                continue;
            }
            self.rollback.set_player_input(packet.player, input, frame)?;
        }
        Ok(())
    }

    /// Resimulates up to the current frame and refreshes the presentation cache.
    pub fn tick(&mut self) {
        self.rollback.simulate_to_current_frame();
    }

    /// Server side: validates `frame` and returns the confirmation to broadcast.
    ///
    /// # Errors
    ///
    /// See [`RollbackManager::validate_frame`]. A frame already validated is refused with
    /// [`RollbackError::InvalidFrame`] since its confirmation was already sent.
    pub fn validate(&mut self, frame: Frame) -> RollbackResult<FrameConfirmation> {
        if frame <= self.rollback.last_validate_frame() {
            return Err(RollbackError::InvalidFrame {
                frame,
                reason: format!(
                    "already validated up to frame {}",
                    self.rollback.last_validate_frame()
                ),
            });
        }
        self.rollback.validate_frame(frame)?;
        self.update_winner();
        Ok(FrameConfirmation::new(
            frame,
            self.rollback.validated_physics_states(),
        ))
    }

    /// Client side: validates the confirmed frame and checks it against the server's state.
    ///
    /// # Errors
    ///
    /// See [`RollbackManager::confirm_frame`].
    pub fn receive_confirmation(&mut self, confirmation: &FrameConfirmation) -> RollbackResult<()> {
        self.rollback
            .confirm_frame(confirmation.frame, &confirmation.physics_states)?;
        self.update_winner();
        Ok(())
    }

    /// The only player left with health on the validated track, once every other player is out.
    ///
    /// Returns `None` while fewer than two players are spawned.
    #[must_use]
    pub fn check_winner(&self) -> Option<PlayerNumber> {
        let track = self.rollback.last_validated_track();
        let mut spawned = 0;
        let mut alive = None;
        for player in PlayerNumber::all() {
            let Some(character) = self
                .rollback
                .player_entity(player)
                .and_then(|entity| track.player_character(entity))
            else {
                continue;
            };
            spawned += 1;
            if character.health > 0 {
                if alive.is_some() {
                    return None;
                }
                alive = Some(player);
            }
        }
        if spawned < 2 {
            return None;
        }
        alive
    }

    /// The winner, once decided. Never changes afterward.
    #[must_use]
    pub fn winner(&self) -> Option<PlayerNumber> {
        self.winner
    }

    fn update_winner(&mut self) {
        if self.winner.is_some() {
            return;
        }
        if let Some(winner) = self.check_winner() {
            info!(
                "Player {} won at frame {}",
                winner,
                self.rollback.last_validate_frame()
            );
            self.winner = Some(winner);
        } else {
            debug!(
                "No winner at frame {}",
                self.rollback.last_validate_frame()
            );
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
    use crate::checksum::PhysicsState;

    const P0: PlayerNumber = PlayerNumber::new(0);
    const P1: PlayerNumber = PlayerNumber::new(1);

    fn game() -> GameManager {
        let mut game = GameManager::new(GameConfig::default()).unwrap();
        game.spawn_default_players().unwrap();
        game
    }

    #[test]
    fn default_players_use_configured_spawns() {
        let game = game();
        let config = *game.config();
        for player in PlayerNumber::all() {
            let entity = game.entity_from_player_number(player);
            assert!(entity.is_valid());
            let index = player.as_usize();
            assert_eq!(
                game.transforms().position(entity),
                Some(config.spawn_positions[index])
            );
            assert_eq!(
                game.transforms().rotation(entity),
                Some(config.spawn_rotations[index])
            );
        }
        assert_eq!(game.player_entities()[0], game.entity_from_player_number(P0));
    }

    #[test]
    fn unspawned_player_has_no_entity() {
        let game = GameManager::new(GameConfig::default()).unwrap();
        assert_eq!(game.entity_from_player_number(P0), Entity::INVALID);
    }

    #[test]
    fn receive_input_skips_known_frames() {
        let mut game = game();
        game.set_player_input(P1, PlayerInput::DOWN, Frame::new(1))
            .unwrap();
        let packet = PlayerInputPacket::new(
            P1,
            Frame::new(3),
            vec![PlayerInput::UP, PlayerInput::UP, PlayerInput::UP],
        );
        game.receive_input(&packet).unwrap();
        let history = game.rollback().input_history();
        assert_eq!(history.input(P1, Frame::new(1)).unwrap(), PlayerInput::DOWN);
        assert_eq!(history.input(P1, Frame::new(2)).unwrap(), PlayerInput::UP);
        assert_eq!(history.input(P1, Frame::new(3)).unwrap(), PlayerInput::UP);
        assert_eq!(history.last_received(P1), Frame::new(3));
    }

    #[test]
    fn server_confirmation_is_accepted_by_client() {
        let mut server = game();
        let mut client = game();
        for frame in 1..=6 {
            for node in [&mut server, &mut client] {
                node.set_player_input(P0, PlayerInput::UP, Frame::new(frame))
                    .unwrap();
                node.set_player_input(P1, PlayerInput::DOWN, Frame::new(frame))
                    .unwrap();
            }
            client.tick();
        }
        let confirmation = server.validate(Frame::new(6)).unwrap();
        client.receive_confirmation(&confirmation).unwrap();
        assert_eq!(client.last_validate_frame(), Frame::new(6));
    }

    #[test]
    fn tampered_confirmation_is_a_desync() {
        let mut game = game();
        game.set_player_input(P0, PlayerInput::UP, Frame::new(1))
            .unwrap();
        game.set_player_input(P1, PlayerInput::UP, Frame::new(1))
            .unwrap();
        let confirmation = FrameConfirmation::new(Frame::new(1), [PhysicsState::new(7); 2]);
        assert!(matches!(
            game.receive_confirmation(&confirmation),
            Err(RollbackError::Desync { .. })
        ));
    }

    #[test]
    fn validating_twice_is_refused() {
        let mut game = game();
        game.set_player_input(P0, PlayerInput::NONE, Frame::new(1))
            .unwrap();
        game.set_player_input(P1, PlayerInput::NONE, Frame::new(1))
            .unwrap();
        game.validate(Frame::new(1)).unwrap();
        assert!(matches!(
            game.validate(Frame::new(1)),
            Err(RollbackError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn no_winner_with_a_single_player() {
        let mut game = GameManager::new(GameConfig::default()).unwrap();
        game.spawn_player(P0, Vec2::new(1.0, 0.0), 0.0).unwrap();
        assert_eq!(game.check_winner(), None);
    }

    #[test]
    fn winner_is_decided_when_the_other_player_is_out() {
        let config = GameConfig {
            player_health: 1,
            ..GameConfig::default()
        };
        let mut game = GameManager::new(config).unwrap();
        game.spawn_default_players().unwrap();
        assert_eq!(game.check_winner(), None);

        // Past the right edge in one step: the right side player concedes.
        game.spawn_ball(Vec2::new(4.99, 0.0), Vec2::new(10.0, 0.0));
        game.set_player_input(P0, PlayerInput::NONE, Frame::new(2))
            .unwrap();
        game.set_player_input(P1, PlayerInput::NONE, Frame::new(2))
            .unwrap();
        game.validate(Frame::new(2)).unwrap();
        assert_eq!(game.winner(), Some(P1));
    }
}
