//! Deterministic checksums used to verify that nodes agree on the simulation.
//!
//! Two fingerprints are provided:
//!
//! - [`PhysicsState`]: the per-player value carried by [`FrameConfirmation`]. It sums the bit
//!   patterns of a body's position and velocity and is cheap enough to compute every
//!   confirmation.
//! - [`state_checksum`]: an FNV-1a hash over the bincode encoding of any serializable value,
//!   used to compare whole simulation tracks (for example in determinism tests).
//!
//! Neither is cryptographic. They only need to be identical on every node for identical state.
//!
//! # Cross-platform determinism
//!
//! [`PhysicsState::from_body`] converts every `f32` with [`f32::to_bits`], which is defined on
//! the numeric value and not on the in-memory byte order, so big- and little-endian nodes
//! produce the same checksum.
//!
//! [`FrameConfirmation`]: crate::FrameConfirmation

use std::hash::Hasher;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::RollbackResult;
use crate::network::codec::encode_state;
use crate::physics::Body;

/// Integer fingerprint of a body's position and velocity.
///
/// # Examples
///
/// ```
/// use paddle_rollback::{Body, PhysicsState};
/// use glam::Vec2;
///
/// // A body at rest at the origin hashes to zero.
/// assert_eq!(PhysicsState::from_body(&Body::default()), PhysicsState::ZERO);
///
/// let moving = Body { position: Vec2::new(1.0, 0.0), velocity: Vec2::ZERO };
/// assert_eq!(PhysicsState::from_body(&moving).as_i32(), 1.0f32.to_bits() as i32);
/// ```
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct PhysicsState(i32);

impl PhysicsState {
    /// The checksum of a body at rest at the origin.
    pub const ZERO: PhysicsState = PhysicsState(0);

    /// Wraps a raw checksum, e.g. one received from the server.
    #[inline]
    #[must_use]
    pub const fn new(value: i32) -> Self {
        PhysicsState(value)
    }

    /// Returns the raw checksum.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Computes the checksum of a body: the wrapping sum of the bit patterns of
    /// `position.x`, `position.y`, `velocity.x` and `velocity.y`.
    #[must_use]
    pub fn from_body(body: &Body) -> Self {
        let sum = vec2_bits(body.position).wrapping_add(vec2_bits(body.velocity));
        PhysicsState(sum)
    }
}

impl std::fmt::Display for PhysicsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reinterprets an `f32` as a signed 32-bit integer through its IEEE-754 bit pattern.
#[inline]
#[must_use]
pub fn f32_to_checksum_bits(value: f32) -> i32 {
    value.to_bits() as i32
}

fn vec2_bits(v: Vec2) -> i32 {
    f32_to_checksum_bits(v.x).wrapping_add(f32_to_checksum_bits(v.y))
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// FNV-1a 64-bit hasher with a fixed seed.
///
/// Unlike `std::collections::hash_map::DefaultHasher` it has no per-process random state,
/// so every node computes the same value.
#[derive(Debug, Clone)]
pub struct StateHasher {
    state: u64,
}

impl StateHasher {
    /// Creates a hasher seeded with the FNV-1a offset basis.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Default for StateHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for StateHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Hashes the bincode encoding of `state` with [`StateHasher`].
///
/// # Errors
///
/// Returns [`RollbackError::Serialization`](crate::RollbackError::Serialization) if the value
/// cannot be encoded.
///
/// # Examples
///
/// ```
/// use paddle_rollback::checksum::state_checksum;
/// use paddle_rollback::Body;
///
/// let body = Body::default();
/// assert_eq!(state_checksum(&body).unwrap(), state_checksum(&body).unwrap());
/// ```
pub fn state_checksum<T: Serialize>(state: &T) -> RollbackResult<u64> {
    let bytes = encode_state(state)?;
    let mut hasher = StateHasher::new();
    hasher.write(&bytes);
    Ok(hasher.finish())
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
    fn body_at_rest_is_zero() {
        let body = Body {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
        };
        assert_eq!(PhysicsState::from_body(&body), PhysicsState::ZERO);
    }

    #[test]
    fn checksum_sums_all_four_fields() {
        let body = Body {
            position: Vec2::new(1.0, -2.0),
            velocity: Vec2::new(0.5, 3.0),
        };
        let expected = [1.0f32, -2.0, 0.5, 3.0]
            .iter()
            .fold(0i32, |acc, v| acc.wrapping_add(v.to_bits() as i32));
        assert_eq!(PhysicsState::from_body(&body).as_i32(), expected);
    }

    #[test]
    fn checksum_wraps_instead_of_overflowing() {
        // -0.0 has only the sign bit set: i32::MIN. Two of them wrap back to zero.
        let body = Body {
            position: Vec2::new(-0.0, -0.0),
            velocity: Vec2::ZERO,
        };
        assert_eq!(PhysicsState::from_body(&body), PhysicsState::ZERO);
    }

    #[test]
    fn negative_zero_differs_from_positive_zero() {
        let body = Body {
            position: Vec2::new(-0.0, 0.0),
            velocity: Vec2::ZERO,
        };
        assert_eq!(PhysicsState::from_body(&body).as_i32(), i32::MIN);
    }

    #[test]
    fn f32_bits_match_ieee_754() {
        assert_eq!(f32_to_checksum_bits(1.0), 0x3f80_0000);
        assert_eq!(f32_to_checksum_bits(-1.0), 0xbf80_0000_u32 as i32);
    }

    #[test]
    fn fnv1a_known_values() {
        let mut hasher = StateHasher::new();
        hasher.write(b"");
        assert_eq!(hasher.finish(), 0xcbf2_9ce4_8422_2325);

        let mut hasher = StateHasher::new();
        hasher.write(b"a");
        assert_eq!(hasher.finish(), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn state_checksum_changes_with_state() {
        let a = Body::default();
        let b = Body {
            position: Vec2::new(0.0, 1.0),
            velocity: Vec2::ZERO,
        };
        assert_ne!(state_checksum(&a).unwrap(), state_checksum(&b).unwrap());
    }
}
