//! Convenient re-exports for common usage.
//!
//! ```rust
//! use paddle_rollback::prelude::*;
//!
//! let mut game = GameManager::new(GameConfig::default()).unwrap();
//! game.spawn_default_players().unwrap();
//! game.set_player_input(PlayerNumber::new(0), PlayerInput::UP, Frame::new(1)).unwrap();
//! game.tick();
//! ```
//!
//! # What's Included
//!
//! - **Game surface**: [`GameManager`], [`RollbackManager`], [`GameConfig`]
//! - **Fundamental types**: [`Frame`], [`PlayerNumber`], [`PlayerInput`], [`Entity`], [`MAX_PLAYERS`]
//! - **Wire messages**: [`FrameConfirmation`], [`PlayerInputPacket`], [`PhysicsState`]
//! - **Presentation**: [`TransformManager`], [`Transform`]
//! - **Error handling**: [`RollbackError`], [`RollbackResult`]

// Game surface
pub use crate::{GameConfig, GameManager, RollbackManager};

// Fundamental types and constants
pub use crate::{Entity, Frame, PlayerInput, PlayerNumber, MAX_PLAYERS};

// Wire messages
pub use crate::{FrameConfirmation, PhysicsState, PlayerInputPacket};

// Presentation
pub use crate::{Transform, TransformManager};

// Error handling
pub use crate::{RollbackError, RollbackResult};
