//! # Paddle Rollback
//!
//! Paddle Rollback is the deterministic simulation core of a two-player paddle game that runs
//! with client-side prediction and authoritative server reconciliation.
//!
//! The core keeps two copies of the game world:
//!
//! - the **current track**, advanced speculatively ahead of confirmed network input, and
//! - the **last-validated track**, the latest state every node agrees on.
//!
//! Whenever new input or a server confirmation arrives, the frames between the two tracks are
//! resimulated from the validated state. Given identical input histories every node produces
//! bit-identical bodies, which is verified with per-player [`PhysicsState`] checksums.
//!
//! ```
//! use paddle_rollback::{GameConfig, GameManager, Frame, PlayerInput, PlayerNumber};
//! use glam::Vec2;
//!
//! let mut game = GameManager::new(GameConfig::default()).unwrap();
//! game.spawn_player(PlayerNumber::new(0), Vec2::new(4.5, 0.0), 0.0).unwrap();
//! game.spawn_player(PlayerNumber::new(1), Vec2::new(-4.5, 0.0), 180.0).unwrap();
//! game.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 1.0));
//!
//! for frame in 1..=10 {
//!     for player in 0..2 {
//!         game.set_player_input(PlayerNumber::new(player), PlayerInput::UP, Frame::new(frame))
//!             .unwrap();
//!     }
//!     game.tick();
//! }
//!
//! let confirmation = game.validate(Frame::new(10)).unwrap();
//! assert_eq!(confirmation.frame, 10);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use checksum::PhysicsState;
pub use config::GameConfig;
pub use ecs::{ComponentTable, Entity, EntityManager, EntityMask};
pub use error::{RollbackError, RollbackResult};
pub use game::GameManager;
pub use gameplay::{Ball, PlayerCharacter};
pub use input_history::InputHistory;
pub use network::messages::{FrameConfirmation, PlayerInputPacket};
pub use physics::{Body, BoxCollider, PhysicsManager};
pub use rollback::{CreatedEntityRecord, RollbackManager, SimulationTrack, StepOutcome};
pub use transform::{Transform, TransformManager};

pub mod checksum;
pub mod config;
pub mod ecs;
#[doc(hidden)]
pub mod error;
pub mod game;
pub mod gameplay;
#[doc(hidden)]
pub mod input_history;
pub mod physics;
pub mod prelude;
pub mod rollback;
pub mod telemetry;
pub mod transform;

/// Wire contract between the simulation core and the transport.
pub mod network {
    /// Binary codec for wire message serialization.
    ///
    /// Provides centralized encoding and decoding of wire messages using bincode.
    pub mod codec;
    pub mod messages;
}

/// Internal module exposing implementation details for testing, fuzzing, and benchmarks.
///
/// # ⚠️ WARNING: No Stability Guarantees
///
/// **This module is NOT part of the public API.** Everything here may change without notice.
/// It exists so that property tests and fuzz targets can drive the input history and the
/// simulation tracks directly, without going through [`GameManager`].
#[doc(hidden)]
pub mod __internal {
    pub use crate::gameplay::{ball, paddle, resolve_trigger};
    pub use crate::input_history::INPUT_HISTORY_LENGTH;
    pub use crate::physics::TriggerPair;
}

// #############
// # CONSTANTS #
// #############

/// The number of players taking part in a match.
pub const MAX_PLAYERS: usize = 2;

/// A frame is a single step of game execution.
///
/// Frames are the fundamental unit of time of the simulation. Each frame represents one fixed
/// timestep ([`GameConfig::fixed_period`]). Frame numbers start at 0 and only ever increase;
/// frame 0 is the spawn state and is never simulated.
///
/// On the wire a frame is an unsigned 32-bit counter.
///
/// # Examples
///
/// ```
/// use paddle_rollback::Frame;
///
/// let frame = Frame::new(0);
/// let next_frame = frame + 1;
/// assert_eq!(next_frame.as_u32(), 1);
/// assert!(next_frame > frame);
/// assert_eq!(next_frame - frame, 1);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Frame(u32);

impl Frame {
    /// The first frame of a match.
    pub const ZERO: Frame = Frame(0);

    /// Creates a new `Frame` from a `u32` value.
    #[inline]
    #[must_use]
    pub const fn new(frame: u32) -> Self {
        Frame(frame)
    }

    /// Returns the underlying `u32` value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the frame directly after this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Frame {
        Frame(self.0 + 1)
    }

    /// Returns how many frames `self` is ahead of `earlier`, or `None` if `earlier` is later.
    #[inline]
    #[must_use]
    pub const fn frames_since(self, earlier: Frame) -> Option<u32> {
        self.0.checked_sub(earlier.0)
    }

    /// Iterates over every frame in `(self, last]`, i.e. the frames a resimulation starting
    /// from `self` has to replay.
    #[inline]
    pub fn range_after(self, last: Frame) -> impl Iterator<Item = Frame> {
        (self.0.saturating_add(1)..=last.0).map(Frame)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Arithmetic operations

impl std::ops::Add<u32> for Frame {
    type Output = Frame;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Frame(self.0 + rhs)
    }
}

impl std::ops::AddAssign<u32> for Frame {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

impl std::ops::Sub<u32> for Frame {
    type Output = Frame;

    #[inline]
    fn sub(self, rhs: u32) -> Self::Output {
        Frame(self.0 - rhs)
    }
}

impl std::ops::Sub<Frame> for Frame {
    type Output = u32;

    #[inline]
    fn sub(self, rhs: Frame) -> Self::Output {
        self.0 - rhs.0
    }
}

impl From<u32> for Frame {
    #[inline]
    fn from(value: u32) -> Self {
        Frame(value)
    }
}

impl From<Frame> for u32 {
    #[inline]
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

impl PartialEq<u32> for Frame {
    #[inline]
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<u32> for Frame {
    #[inline]
    fn partial_cmp(&self, other: &u32) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

/// Identifies one of the [`MAX_PLAYERS`] participants of a match.
///
/// Player numbers double as paddle parity: even players defend the right side and push the
/// ball leftward, odd players defend the left side and push it rightward.
///
/// # Examples
///
/// ```
/// use paddle_rollback::PlayerNumber;
///
/// let player = PlayerNumber::new(1);
/// assert!(player.is_valid());
/// assert!(!player.is_even());
/// assert!(!PlayerNumber::INVALID.is_valid());
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PlayerNumber(u8);

impl PlayerNumber {
    /// Sentinel for "no player", e.g. a ball nobody has touched yet.
    pub const INVALID: PlayerNumber = PlayerNumber(u8::MAX);

    /// Creates a new `PlayerNumber`.
    ///
    /// Note: This does not validate the number. Use [`is_valid()`](Self::is_valid).
    #[inline]
    #[must_use]
    pub const fn new(number: u8) -> Self {
        PlayerNumber(number)
    }

    /// Returns the underlying `u8` value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns the player number as an index into per-player arrays.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` if this number refers to one of the [`MAX_PLAYERS`] players.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        (self.0 as usize) < MAX_PLAYERS
    }

    /// Returns `true` for even player numbers.
    #[inline]
    #[must_use]
    pub const fn is_even(self) -> bool {
        self.0 % 2 == 0
    }

    /// Iterates over every valid player number.
    pub fn all() -> impl Iterator<Item = PlayerNumber> {
        (0..MAX_PLAYERS as u8).map(PlayerNumber)
    }
}

impl Default for PlayerNumber {
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Display for PlayerNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for PlayerNumber {
    #[inline]
    fn from(value: u8) -> Self {
        PlayerNumber(value)
    }
}

/// The buttons a player holds during one frame, encoded as a bitmask.
///
/// # Examples
///
/// ```
/// use paddle_rollback::PlayerInput;
///
/// let input = PlayerInput::UP | PlayerInput::DOWN;
/// assert!(input.contains(PlayerInput::UP));
/// assert_eq!(input.vertical_intent(), 0.0);
/// assert_eq!(PlayerInput::DOWN.vertical_intent(), -1.0);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PlayerInput(u8);

impl PlayerInput {
    /// No button held.
    pub const NONE: PlayerInput = PlayerInput(0);
    /// Move the paddle up.
    pub const UP: PlayerInput = PlayerInput(1 << 0);
    /// Move the paddle down.
    pub const DOWN: PlayerInput = PlayerInput(1 << 1);

    /// Creates an input from its raw bitmask. Unknown bits are kept but ignored by the rules.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        PlayerInput(bits)
    }

    /// Returns the raw bitmask.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: PlayerInput) -> bool {
        self.0 & other.0 == other.0
    }

    /// Decodes the signed vertical intent: `UP` minus `DOWN`.
    #[inline]
    #[must_use]
    pub fn vertical_intent(self) -> f32 {
        let up = if self.contains(Self::UP) { 1.0 } else { 0.0 };
        let down = if self.contains(Self::DOWN) { 1.0 } else { 0.0 };
        up - down
    }
}

impl std::ops::BitOr for PlayerInput {
    type Output = PlayerInput;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        PlayerInput(self.0 | rhs.0)
    }
}

// #########
// # TESTS #
// #########

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
    fn frame_arithmetic() {
        let frame = Frame::new(10);
        assert_eq!(frame + 5, Frame::new(15));
        assert_eq!(frame - 3, Frame::new(7));
        assert_eq!(Frame::new(15) - frame, 5);
        assert_eq!(frame.next(), Frame::new(11));
    }

    #[test]
    fn frames_since_rejects_later_frames() {
        assert_eq!(Frame::new(10).frames_since(Frame::new(4)), Some(6));
        assert_eq!(Frame::new(4).frames_since(Frame::new(10)), None);
    }

    #[test]
    fn range_after_excludes_start_and_includes_end() {
        let frames: Vec<u32> = Frame::new(3)
            .range_after(Frame::new(6))
            .map(Frame::as_u32)
            .collect();
        assert_eq!(frames, vec![4, 5, 6]);
        assert_eq!(Frame::new(6).range_after(Frame::new(6)).count(), 0);
    }

    #[test]
    fn frame_display() {
        assert_eq!(Frame::new(42).to_string(), "42");
    }

    #[test]
    fn player_number_validity_and_parity() {
        assert!(PlayerNumber::new(0).is_valid());
        assert!(PlayerNumber::new(1).is_valid());
        assert!(!PlayerNumber::new(2).is_valid());
        assert!(PlayerNumber::new(0).is_even());
        assert!(!PlayerNumber::new(1).is_even());
        assert_eq!(PlayerNumber::default(), PlayerNumber::INVALID);
        assert_eq!(PlayerNumber::all().count(), MAX_PLAYERS);
    }

    #[test]
    fn input_vertical_intent() {
        assert_eq!(PlayerInput::NONE.vertical_intent(), 0.0);
        assert_eq!(PlayerInput::UP.vertical_intent(), 1.0);
        assert_eq!(PlayerInput::DOWN.vertical_intent(), -1.0);
        assert_eq!((PlayerInput::UP | PlayerInput::DOWN).vertical_intent(), 0.0);
    }

    #[test]
    fn input_ignores_unknown_bits() {
        let input = PlayerInput::from_bits(0b1000_0001);
        assert!(input.contains(PlayerInput::UP));
        assert_eq!(input.vertical_intent(), 1.0);
    }
}
