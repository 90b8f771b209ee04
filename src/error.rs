use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::checksum::PhysicsState;
use crate::network::codec::CodecError;
use crate::{Frame, PlayerNumber};

/// Result type used across the crate.
pub type RollbackResult<T> = Result<T, RollbackError>;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), RollbackError>`].
///
/// [`IncompleteInput`](RollbackError::IncompleteInput) and [`Desync`](RollbackError::Desync) are
/// fatal for the match: the caller has to abort the session or resynchronize explicitly.
///
/// [`Result<(), RollbackError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RollbackError {
    /// A frame was about to be validated while a player's input for it has not been received yet.
    IncompleteInput {
        /// The frame that could not be validated.
        frame: Frame,
        /// The first player lacking input coverage.
        player: PlayerNumber,
        /// The last frame received from that player.
        last_received: Frame,
    },
    /// The locally validated physics state of a player differs from the authoritative one.
    Desync {
        /// The confirmed frame.
        frame: Frame,
        /// The player whose body diverged.
        player: PlayerNumber,
        /// Checksum computed locally.
        local: PhysicsState,
        /// Checksum sent by the server.
        remote: PhysicsState,
    },
    /// An invalid frame number was provided.
    InvalidFrame {
        /// The frame that was invalid.
        frame: Frame,
        /// A description of why the frame was invalid.
        reason: String,
    },
    /// An invalid player number was provided. Player numbers must be less than [`MAX_PLAYERS`](crate::MAX_PLAYERS).
    InvalidPlayerNumber {
        /// The player number that was invalid.
        player: PlayerNumber,
        /// The maximum valid player number.
        max: PlayerNumber,
    },
    /// The game configuration is inconsistent.
    InvalidConfig {
        /// Further specifies why the configuration was rejected.
        info: String,
    },
    /// Serialization or deserialization of a wire message failed.
    Serialization {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
}

impl RollbackError {
    /// Returns `true` for errors after which the match cannot safely continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::IncompleteInput { .. } | Self::Desync { .. })
    }
}

impl Display for RollbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackError::IncompleteInput {
                frame,
                player,
                last_received,
            } => {
                write!(
                    f,
                    "Cannot validate frame {}: player {} has only sent input up to frame {}",
                    frame, player, last_received
                )
            },
            RollbackError::Desync {
                frame,
                player,
                local,
                remote,
            } => {
                write!(
                    f,
                    "Desynchronization detected on frame {} for player {}: local physics state {}, remote {}",
                    frame, player, local, remote
                )
            },
            RollbackError::InvalidFrame { frame, reason } => {
                write!(f, "Invalid frame {}: {}", frame, reason)
            },
            RollbackError::InvalidPlayerNumber { player, max } => {
                write!(
                    f,
                    "Invalid player number {}: must be less than or equal to {}",
                    player, max
                )
            },
            RollbackError::InvalidConfig { info } => {
                write!(f, "Invalid configuration: {}", info)
            },
            RollbackError::Serialization { context } => {
                write!(f, "Serialization error: {}", context)
            },
        }
    }
}

impl Error for RollbackError {}

impl From<CodecError> for RollbackError {
    fn from(err: CodecError) -> Self {
        RollbackError::Serialization {
            context: err.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::codec::CodecOperation;

    #[test]
    fn incomplete_input_display_names_player_and_frames() {
        let err = RollbackError::IncompleteInput {
            frame: Frame::new(10),
            player: PlayerNumber::new(1),
            last_received: Frame::new(4),
        };
        let msg = err.to_string();
        assert!(msg.contains("frame 10"));
        assert!(msg.contains("player 1"));
        assert!(msg.contains("frame 4"));
    }

    #[test]
    fn desync_display_contains_both_checksums() {
        let err = RollbackError::Desync {
            frame: Frame::new(3),
            player: PlayerNumber::new(0),
            local: PhysicsState::new(7),
            remote: PhysicsState::new(-9),
        };
        let msg = err.to_string();
        assert!(msg.contains("local physics state 7"));
        assert!(msg.contains("remote -9"));
    }

    #[test]
    fn only_validation_and_desync_are_fatal() {
        assert!(RollbackError::Desync {
            frame: Frame::ZERO,
            player: PlayerNumber::new(0),
            local: PhysicsState::ZERO,
            remote: PhysicsState::new(1),
        }
        .is_fatal());
        assert!(!RollbackError::InvalidConfig {
            info: String::new()
        }
        .is_fatal());
    }

    #[test]
    fn codec_errors_convert_to_serialization() {
        let err: RollbackError = CodecError::decode("eof", CodecOperation::DecodeMessage).into();
        assert!(matches!(err, RollbackError::Serialization { .. }));
    }
}
