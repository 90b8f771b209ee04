//! Per-player input history.
//!
//! Each player has a fixed-length buffer of [`PlayerInput`]s indexed by *offset*: offset 0 holds
//! the input for the current frame, offset `n` the input for `current_frame - n`. Advancing
//! the current frame shifts every buffer toward higher offsets and predicts the new frames by
//! repeating the newest known input.
//!
//! ```text
//! current_frame = 12, length = 8
//!
//! offset:  0   1   2   3   4   5   6   7
//! frame:  12  11  10   9   8   7   6   5
//!                  ^
//!                  last received frame for this player: 10, offsets 0..2 are predictions
//! ```

use std::collections::VecDeque;

use crate::error::{RollbackError, RollbackResult};
use crate::report_violation;
use crate::telemetry::{InvariantChecker, InvariantViolation, ViolationKind, ViolationSeverity};
use crate::{Frame, PlayerInput, PlayerNumber, MAX_PLAYERS};

/// Default number of frames of input kept per player.
/// At 50 frames per second, 128 frames is a little over 2.5 seconds.
///
/// # Note
///
/// This constant is re-exported in [`__internal`](crate::__internal) for testing and fuzzing.
/// It is not part of the stable public API.
pub const INPUT_HISTORY_LENGTH: usize = 128;

/// Input buffers of every player, plus the frame they are relative to.
///
/// # Note
///
/// This type is re-exported for testing and fuzzing. Regular users go through
/// [`RollbackManager::set_player_input`](crate::RollbackManager::set_player_input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputHistory {
    length: usize,
    current_frame: Frame,
    inputs: [VecDeque<PlayerInput>; MAX_PLAYERS],
    last_received: [Frame; MAX_PLAYERS],
}

impl Default for InputHistory {
    fn default() -> Self {
        Self::filled(INPUT_HISTORY_LENGTH)
    }
}

impl InputHistory {
    /// Creates a history of [`INPUT_HISTORY_LENGTH`] frames.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history of `length` frames.
    ///
    /// Returns `None` if `length < 2`: one slot for the current frame and at least one
    /// for the past.
    #[must_use]
    pub fn with_length(length: usize) -> Option<Self> {
        if length < 2 {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Configuration,
                "input history length must be at least 2, got {}",
                length
            );
            return None;
        }
        Some(Self::filled(length))
    }

    fn filled(length: usize) -> Self {
        let buffer: VecDeque<PlayerInput> = std::iter::repeat(PlayerInput::NONE).take(length).collect();
        Self {
            length,
            current_frame: Frame::ZERO,
            inputs: std::array::from_fn(|_| buffer.clone()),
            last_received: [Frame::ZERO; MAX_PLAYERS],
        }
    }

    /// Number of frames kept per player.
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Always `false`: a history holds at least two frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The frame at offset 0.
    #[must_use]
    pub fn current_frame(&self) -> Frame {
        self.current_frame
    }

    /// Newest frame received from `player`. Frames up to it hold real input, later ones hold
    /// predictions. Invalid players report [`Frame::ZERO`].
    #[must_use]
    pub fn last_received(&self, player: PlayerNumber) -> Frame {
        self.last_received
            .get(player.as_usize())
            .copied()
            .unwrap_or(Frame::ZERO)
    }

    /// Oldest frame still held.
    #[must_use]
    pub fn oldest_frame(&self) -> Frame {
        Frame::new(
            self.current_frame
                .as_u32()
                .saturating_sub((self.length - 1) as u32),
        )
    }

    /// Moves the current frame forward to `new_frame`.
    ///
    /// Every buffer shifts by `delta = new_frame - current_frame`: the entry at offset `i` moves
    /// to offset `i + delta` (entries pushed past the end are dropped), and offsets `0..delta`
    /// receive the input previously at offset 0. Frames at or before the current frame are
    /// ignored.
    pub fn start_new_frame(&mut self, new_frame: Frame) {
        let Some(delta) = new_frame.frames_since(self.current_frame) else {
            return;
        };
        if delta == 0 {
            return;
        }
        let fill = (delta as usize).min(self.length);
        for buffer in &mut self.inputs {
            let newest = buffer.front().copied().unwrap_or_default();
            for _ in 0..fill {
                buffer.push_front(newest);
            }
            buffer.truncate(self.length);
        }
        self.current_frame = new_frame;
    }

    /// Records `player`'s input for `frame`.
    ///
    /// A frame past the current frame first advances it (see [`start_new_frame`]). The first
    /// time `frame` passes the player's last received frame, the same input is also written to
    /// the skipped frames in between and to every later, predicted, frame.
    ///
    /// # Errors
    ///
    /// - [`RollbackError::InvalidPlayerNumber`] for an unknown player.
    /// - [`RollbackError::InvalidFrame`] if `frame` is older than the history.
    ///
    /// [`start_new_frame`]: InputHistory::start_new_frame
    pub fn set_input(
        &mut self,
        player: PlayerNumber,
        input: PlayerInput,
        frame: Frame,
    ) -> RollbackResult<()> {
        let index = player_index(player)?;
        if frame > self.current_frame {
            self.start_new_frame(frame);
        }
        let offset = self.offset_of(frame)?;

        let last_received = self.last_received[index];
        let buffer = &mut self.inputs[index];
        if let Some(slot) = buffer.get_mut(offset) {
            *slot = input;
        }

        if frame > last_received {
            // Predicted frames after `frame`.
            for slot in buffer.iter_mut().take(offset) {
                *slot = input;
            }
            // Frames skipped since the previous input.
            let gap = (frame - last_received).saturating_sub(1) as usize;
            for slot in buffer.iter_mut().skip(offset + 1).take(gap) {
                *slot = input;
            }
            self.last_received[index] = frame;
        }
        Ok(())
    }

    /// Input of `player` for `frame`, real or predicted.
    ///
    /// # Errors
    ///
    /// - [`RollbackError::InvalidPlayerNumber`] for an unknown player.
    /// - [`RollbackError::InvalidFrame`] if `frame` is in the future or older than the history.
    pub fn input(&self, player: PlayerNumber, frame: Frame) -> RollbackResult<PlayerInput> {
        let index = player_index(player)?;
        if frame > self.current_frame {
            return Err(RollbackError::InvalidFrame {
                frame,
                reason: format!("frame is after the current frame {}", self.current_frame),
            });
        }
        let offset = self.offset_of(frame)?;
        self.inputs[index]
            .get(offset)
            .copied()
            .ok_or_else(|| too_old(frame, self.oldest_frame()))
    }

    /// Input of `player` at `offset`, `None` past the end or for unknown players.
    #[must_use]
    pub fn input_at_offset(&self, player: PlayerNumber, offset: usize) -> Option<PlayerInput> {
        self.inputs.get(player.as_usize())?.get(offset).copied()
    }

    /// `player`'s buffer, newest first.
    pub fn inputs(&self, player: PlayerNumber) -> impl Iterator<Item = PlayerInput> + '_ {
        self.inputs
            .get(player.as_usize())
            .into_iter()
            .flat_map(|buffer| buffer.iter().copied())
    }

    /// The first player whose last received frame is before `frame`, if any.
    #[must_use]
    pub fn first_player_missing(&self, frame: Frame) -> Option<PlayerNumber> {
        PlayerNumber::all().find(|player| self.last_received(*player) < frame)
    }

    fn offset_of(&self, frame: Frame) -> RollbackResult<usize> {
        let offset = self.current_frame.frames_since(frame).unwrap_or(0) as usize;
        if offset >= self.length {
            return Err(too_old(frame, self.oldest_frame()));
        }
        Ok(offset)
    }
}

fn player_index(player: PlayerNumber) -> RollbackResult<usize> {
    if !player.is_valid() {
        return Err(RollbackError::InvalidPlayerNumber {
            player,
            max: PlayerNumber::new((MAX_PLAYERS - 1) as u8),
        });
    }
    Ok(player.as_usize())
}

fn too_old(frame: Frame, oldest: Frame) -> RollbackError {
    RollbackError::InvalidFrame {
        frame,
        reason: format!("input history only reaches back to frame {}", oldest),
    }
}

impl InvariantChecker for InputHistory {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for (index, buffer) in self.inputs.iter().enumerate() {
            if buffer.len() != self.length {
                return Err(InvariantViolation::new(
                    "InputHistory",
                    "buffer length differs from history length",
                )
                .with_details(format!(
                    "player={}, len={}, expected={}",
                    index,
                    buffer.len(),
                    self.length
                )));
            }
        }
        for (index, last) in self.last_received.iter().enumerate() {
            if *last > self.current_frame {
                return Err(InvariantViolation::new(
                    "InputHistory",
                    "last received frame is after the current frame",
                )
                .with_details(format!(
                    "player={}, last_received={}, current_frame={}",
                    index, last, self.current_frame
                )));
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
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    const P0: PlayerNumber = PlayerNumber::new(0);
    const P1: PlayerNumber = PlayerNumber::new(1);

    fn history(length: usize) -> InputHistory {
        InputHistory::with_length(length).unwrap()
    }

    #[test]
    fn starts_empty_at_frame_zero() {
        let history = InputHistory::new();
        assert_eq!(history.len(), INPUT_HISTORY_LENGTH);
        assert_eq!(history.current_frame(), Frame::ZERO);
        assert_eq!(history.last_received(P0), Frame::ZERO);
        assert!(history.inputs(P1).all(|input| input == PlayerInput::NONE));
        assert!(history.check_invariants().is_ok());
    }

    #[test]
    fn rejects_tiny_length() {
        assert!(InputHistory::with_length(1).is_none());
        assert!(InputHistory::with_length(2).is_some());
    }

    #[test]
    fn shift_moves_entries_and_repeats_newest() {
        let mut history = history(6);
        for frame in 1..=3 {
            let input = PlayerInput::from_bits(frame as u8);
            history.set_input(P0, input, Frame::new(frame)).unwrap();
        }
        // offsets: [3, 2, 1, 0, 0, 0]
        history.start_new_frame(Frame::new(5));
        let bits: Vec<u8> = history.inputs(P0).map(PlayerInput::bits).collect();
        assert_eq!(bits, vec![3, 3, 3, 2, 1, 0]);
    }

    #[test]
    fn shift_past_length_fills_everything() {
        let mut history = history(4);
        history.set_input(P1, PlayerInput::DOWN, Frame::new(1)).unwrap();
        history.start_new_frame(Frame::new(50));
        assert!(history.inputs(P1).all(|input| input == PlayerInput::DOWN));
        assert_eq!(history.current_frame(), Frame::new(50));
    }

    #[test]
    fn shift_backwards_is_ignored() {
        let mut history = history(4);
        history.start_new_frame(Frame::new(3));
        history.start_new_frame(Frame::new(2));
        assert_eq!(history.current_frame(), Frame::new(3));
    }

    #[test]
    fn future_input_advances_current_frame() {
        let mut history = history(8);
        history.set_input(P0, PlayerInput::UP, Frame::new(4)).unwrap();
        assert_eq!(history.current_frame(), Frame::new(4));
        assert_eq!(history.last_received(P0), Frame::new(4));
        assert_eq!(history.last_received(P1), Frame::ZERO);
        assert_eq!(history.input(P0, Frame::new(4)).unwrap(), PlayerInput::UP);
    }

    #[test]
    fn first_input_fills_gap_and_predictions() {
        let mut history = history(16);
        history.set_input(P0, PlayerInput::DOWN, Frame::new(2)).unwrap();
        history.start_new_frame(Frame::new(10));
        history.set_input(P0, PlayerInput::UP, Frame::new(6)).unwrap();

        for frame in 0..=2 {
            let expected = if frame == 0 { PlayerInput::NONE } else { PlayerInput::DOWN };
            assert_eq!(history.input(P0, Frame::new(frame)).unwrap(), expected, "frame {frame}");
        }
        for frame in 3..=10 {
            assert_eq!(
                history.input(P0, Frame::new(frame)).unwrap(),
                PlayerInput::UP,
                "frame {frame}"
            );
        }
        assert_eq!(history.last_received(P0), Frame::new(6));
    }

    #[test]
    fn late_input_for_received_frame_only_overwrites_its_slot() {
        let mut history = history(16);
        history.set_input(P0, PlayerInput::UP, Frame::new(5)).unwrap();
        history.set_input(P0, PlayerInput::DOWN, Frame::new(3)).unwrap();
        assert_eq!(history.input(P0, Frame::new(3)).unwrap(), PlayerInput::DOWN);
        assert_eq!(history.input(P0, Frame::new(4)).unwrap(), PlayerInput::UP);
        assert_eq!(history.input(P0, Frame::new(5)).unwrap(), PlayerInput::UP);
        assert_eq!(history.last_received(P0), Frame::new(5));
    }

    #[test]
    fn input_older_than_history_is_rejected() {
        let mut history = history(4);
        history.start_new_frame(Frame::new(10));
        let err = history
            .set_input(P0, PlayerInput::UP, Frame::new(6))
            .unwrap_err();
        assert!(matches!(err, RollbackError::InvalidFrame { .. }));
        assert!(history.set_input(P0, PlayerInput::UP, Frame::new(7)).is_ok());
        assert_eq!(history.oldest_frame(), Frame::new(7));
    }

    #[test]
    fn unknown_player_is_rejected() {
        let mut history = history(4);
        let err = history
            .set_input(PlayerNumber::new(2), PlayerInput::UP, Frame::new(1))
            .unwrap_err();
        assert!(matches!(err, RollbackError::InvalidPlayerNumber { .. }));
        assert!(history.input(PlayerNumber::INVALID, Frame::ZERO).is_err());
    }

    #[test]
    fn reading_the_future_is_rejected() {
        let history = history(4);
        assert!(history.input(P0, Frame::new(1)).is_err());
    }

    #[test]
    fn first_player_missing_reports_lowest_player() {
        let mut history = history(16);
        history.set_input(P0, PlayerInput::UP, Frame::new(10)).unwrap();
        history.set_input(P1, PlayerInput::UP, Frame::new(4)).unwrap();
        assert_eq!(history.first_player_missing(Frame::new(10)), Some(P1));
        assert_eq!(history.first_player_missing(Frame::new(4)), None);
    }
}
