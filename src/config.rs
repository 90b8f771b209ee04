//! Game configuration.
//!
//! Every tunable constant of the simulation lives in [`GameConfig`], which is handed to the
//! [`RollbackManager`](crate::RollbackManager) at construction and never mutated afterwards.
//! All nodes of a match must use the same configuration, otherwise their checksums diverge.
//!
//! | Preset | Input history | Use |
//! |--------|---------------|-----|
//! | [`GameConfig::default()`] | 128 frames | regular matches |
//! | [`GameConfig::competitive()`] | 256 frames | high latency links |
//! | [`GameConfig::minimal()`] | 16 frames | tests, memory constrained nodes |
//!
//! # Example
//!
//! ```
//! use paddle_rollback::GameConfig;
//! use glam::Vec2;
//!
//! let config = GameConfig {
//!     arena_extents: Vec2::new(6.0, 3.5),
//!     player_health: 3,
//!     ..GameConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use glam::Vec2;

use crate::error::{RollbackError, RollbackResult};
use crate::input_history::INPUT_HISTORY_LENGTH;
use crate::{PlayerNumber, MAX_PLAYERS};

/// Immutable simulation constants.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Construct instances with the
/// `..GameConfig::default()` pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "GameConfig has no effect unless passed to GameManager::new() or RollbackManager::new()"]
pub struct GameConfig {
    /// Duration of one simulated frame, in seconds.
    ///
    /// Default: 0.02 (50 frames per second)
    pub fixed_period: f32,

    /// Half size of the arena. A ball beyond `x` on either side concedes a point, a ball
    /// beyond `y` bounces. Paddles stop at `y`.
    ///
    /// Default: (5, 3)
    pub arena_extents: Vec2,

    /// Vertical acceleration applied to a paddle while a direction is held, in units/s².
    ///
    /// Default: 1.0
    pub paddle_acceleration: f32,

    /// Half extents of a paddle's collider.
    ///
    /// Default: (0.5, 0.9)
    pub paddle_box_extents: Vec2,

    /// Half extents of a ball's collider.
    ///
    /// Default: (0.08, 0.08)
    pub ball_box_extents: Vec2,

    /// Health every player starts with. A player at 0 has lost.
    ///
    /// Default: 5
    pub player_health: i16,

    /// Invincibility granted to a player after conceding a point, in seconds.
    ///
    /// Default: 1.5
    pub invincibility_period: f32,

    /// Frames of input kept per player. Bounds how far back input may arrive and how far
    /// the current frame may run ahead of the last validated frame.
    ///
    /// Default: 128
    pub input_history_length: usize,

    /// Player who loses health when the ball leaves the arena on the right.
    ///
    /// Default: player 0
    pub right_side_player: PlayerNumber,

    /// Player who loses health when the ball leaves the arena on the left.
    ///
    /// Default: player 1
    pub left_side_player: PlayerNumber,

    /// Spawn position per player number.
    ///
    /// Default: (1, 0) and (-1, 0)
    pub spawn_positions: [Vec2; MAX_PLAYERS],

    /// Spawn rotation per player number, in degrees.
    ///
    /// Default: 0 and 180
    pub spawn_rotations: [f32; MAX_PLAYERS],

    /// Presentation scale of a paddle.
    ///
    /// Default: (5, 5)
    pub player_scale: Vec2,

    /// Presentation scale of a ball.
    ///
    /// Default: (2.5, 2.5)
    pub ball_scale: Vec2,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            fixed_period: 0.02,
            arena_extents: Vec2::new(5.0, 3.0),
            paddle_acceleration: 1.0,
            paddle_box_extents: Vec2::new(0.5, 0.9),
            ball_box_extents: Vec2::new(0.08, 0.08),
            player_health: 5,
            invincibility_period: 1.5,
            input_history_length: INPUT_HISTORY_LENGTH,
            right_side_player: PlayerNumber::new(0),
            left_side_player: PlayerNumber::new(1),
            spawn_positions: [Vec2::new(1.0, 0.0), Vec2::new(-1.0, 0.0)],
            spawn_rotations: [0.0, 180.0],
            player_scale: Vec2::new(5.0, 5.0),
            ball_scale: Vec2::new(2.5, 2.5),
        }
    }
}

impl GameConfig {
    /// Creates a new `GameConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for links with high or unstable latency.
    ///
    /// Doubles the input history so clients may run further ahead of validation.
    pub fn competitive() -> Self {
        Self {
            input_history_length: 256,
            ..Self::default()
        }
    }

    /// Preset with a small input history, for tests and memory constrained nodes.
    pub fn minimal() -> Self {
        Self {
            input_history_length: 16,
            ..Self::default()
        }
    }

    /// Bound a paddle may not move past, on both sides of the arena's horizontal axis.
    #[must_use]
    pub fn paddle_bound(&self) -> f32 {
        self.arena_extents.y
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::InvalidConfig`] if a period or extent is not strictly positive
    /// and finite, if the input history holds fewer than 2 frames, or if both arena sides map to
    /// the same (or an invalid) player.
    pub fn validate(&self) -> RollbackResult<()> {
        if !(self.fixed_period.is_finite() && self.fixed_period > 0.0) {
            return Err(invalid(format!(
                "fixed_period must be positive, got {}",
                self.fixed_period
            )));
        }
        for (name, extents) in [
            ("arena_extents", self.arena_extents),
            ("paddle_box_extents", self.paddle_box_extents),
            ("ball_box_extents", self.ball_box_extents),
        ] {
            if !(extents.is_finite() && extents.x > 0.0 && extents.y > 0.0) {
                return Err(invalid(format!("{name} must be positive, got {extents}")));
            }
        }
        if !self.paddle_acceleration.is_finite() || self.paddle_acceleration < 0.0 {
            return Err(invalid(format!(
                "paddle_acceleration must be non-negative, got {}",
                self.paddle_acceleration
            )));
        }
        if !self.invincibility_period.is_finite() || self.invincibility_period < 0.0 {
            return Err(invalid(format!(
                "invincibility_period must be non-negative, got {}",
                self.invincibility_period
            )));
        }
        if self.player_health <= 0 {
            return Err(invalid(format!(
                "player_health must be positive, got {}",
                self.player_health
            )));
        }
        if self.input_history_length < 2 {
            return Err(invalid(format!(
                "input_history_length must be at least 2, got {}",
                self.input_history_length
            )));
        }
        if !self.right_side_player.is_valid() || !self.left_side_player.is_valid() {
            return Err(invalid(format!(
                "side players must be below {MAX_PLAYERS}, got right={} left={}",
                self.right_side_player, self.left_side_player
            )));
        }
        if self.right_side_player == self.left_side_player {
            return Err(invalid(format!(
                "both arena sides belong to player {}",
                self.right_side_player
            )));
        }
        Ok(())
    }
}

fn invalid(info: String) -> RollbackError {
    RollbackError::InvalidConfig { info }
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

    #[test]
    fn default_is_valid() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fixed_period, 0.02);
        assert_eq!(config.input_history_length, 128);
        assert_eq!(config.paddle_bound(), 3.0);
    }

    #[test]
    fn presets_are_valid() {
        assert!(GameConfig::competitive().validate().is_ok());
        assert!(GameConfig::minimal().validate().is_ok());
        assert!(GameConfig::competitive().input_history_length > GameConfig::new().input_history_length);
    }

    #[test]
    fn rejects_non_positive_period() {
        let config = GameConfig {
            fixed_period: 0.0,
            ..GameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RollbackError::InvalidConfig { .. })
        ));

        let config = GameConfig {
            fixed_period: f32::NAN,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_extents() {
        let config = GameConfig {
            ball_box_extents: Vec2::new(0.08, 0.0),
            ..GameConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ball_box_extents"));
    }

    #[test]
    fn rejects_tiny_history() {
        let config = GameConfig {
            input_history_length: 1,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_shared_side() {
        let config = GameConfig {
            left_side_player: PlayerNumber::new(0),
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GameConfig {
            left_side_player: PlayerNumber::INVALID,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_health() {
        let config = GameConfig {
            player_health: 0,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
