//! Messages exchanged between the server and the clients.
//!
//! The transport itself (framing, delivery, ordering) lives outside this crate. It only has to
//! deliver these messages in increasing frame order per sender.

use serde::{Deserialize, Serialize};

use crate::checksum::PhysicsState;
use crate::{Frame, PlayerInput, PlayerNumber, MAX_PLAYERS};

/// Sent by the server after it validated a frame.
///
/// Carries the authoritative [`PhysicsState`] of every player's body on the validated track.
/// Clients feed it to [`GameManager::receive_confirmation`](crate::GameManager::receive_confirmation).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameConfirmation {
    /// The frame the server validated.
    pub frame: Frame,
    /// Physics state checksum per player number.
    pub physics_states: [PhysicsState; MAX_PLAYERS],
}

impl FrameConfirmation {
    /// Creates a new confirmation.
    #[must_use]
    pub const fn new(frame: Frame, physics_states: [PhysicsState; MAX_PLAYERS]) -> Self {
        Self {
            frame,
            physics_states,
        }
    }
}

/// Sent by a client every frame.
///
/// `inputs[0]` is the input for `frame`, `inputs[i]` the input for `frame - i`. Resending a
/// short history lets the receiver fill a frame whose packet was lost.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInputPacket {
    /// The sending player.
    pub player: PlayerNumber,
    /// The newest frame carried by this packet.
    pub frame: Frame,
    /// Inputs, newest first.
    pub inputs: Vec<PlayerInput>,
}

impl PlayerInputPacket {
    /// Creates a new input packet.
    #[must_use]
    pub fn new(player: PlayerNumber, frame: Frame, inputs: Vec<PlayerInput>) -> Self {
        Self {
            player,
            frame,
            inputs,
        }
    }

    /// Iterates over `(frame, input)` pairs in increasing frame order, skipping entries that
    /// would lie before frame 0.
    pub fn frames(&self) -> impl Iterator<Item = (Frame, PlayerInput)> + '_ {
        let newest = self.frame.as_u32();
        self.inputs
            .iter()
            .enumerate()
            .rev()
            .filter_map(move |(offset, input)| {
                let offset = u32::try_from(offset).ok()?;
                newest
                    .checked_sub(offset)
                    .map(|frame| (Frame::new(frame), *input))
            })
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

    #[test]
    fn packet_frames_are_oldest_first() {
        let packet = PlayerInputPacket::new(
            PlayerNumber::new(0),
            Frame::new(10),
            vec![PlayerInput::UP, PlayerInput::NONE, PlayerInput::DOWN],
        );
        let frames: Vec<_> = packet.frames().collect();
        assert_eq!(
            frames,
            vec![
                (Frame::new(8), PlayerInput::DOWN),
                (Frame::new(9), PlayerInput::NONE),
                (Frame::new(10), PlayerInput::UP),
            ]
        );
    }

    #[test]
    fn packet_frames_stop_at_frame_zero() {
        let packet = PlayerInputPacket::new(
            PlayerNumber::new(1),
            Frame::new(1),
            vec![PlayerInput::UP, PlayerInput::UP, PlayerInput::UP],
        );
        let frames: Vec<_> = packet.frames().map(|(frame, _)| frame.as_u32()).collect();
        assert_eq!(frames, vec![0, 1]);
    }
}
