//! Binary codec for wire messages.
//!
//! Both the server and the clients encode [`FrameConfirmation`] and [`PlayerInputPacket`]
//! values through this module, so the bincode configuration lives in exactly one place.
//! Fixed-size integer encoding keeps message sizes independent of the values carried: a
//! confirmation is always `4 + 4 * MAX_PLAYERS` bytes.
//!
//! # Examples
//!
//! ```
//! use paddle_rollback::network::codec::{decode, encode};
//! use paddle_rollback::{FrameConfirmation, Frame, PhysicsState};
//!
//! let confirmation = FrameConfirmation::new(Frame::new(12), [PhysicsState::new(3); 2]);
//! let bytes = encode(&confirmation).expect("encoding should succeed");
//! let (decoded, read): (FrameConfirmation, _) = decode(&bytes).expect("decoding should succeed");
//! assert_eq!(decoded, confirmation);
//! assert_eq!(read, bytes.len());
//! ```
//!
//! [`FrameConfirmation`]: crate::FrameConfirmation
//! [`PlayerInputPacket`]: crate::PlayerInputPacket

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

// Fixed-width integers: the transport may rely on message sizes, and every node must produce
// identical bytes for identical messages.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Represents what operation was being performed when a codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding a wire message.
    EncodeMessage,
    /// Decoding a wire message.
    DecodeMessage,
    /// Encoding into a caller-provided buffer.
    EncodeIntoBuffer,
    /// Encoding simulation state for a checksum.
    EncodeState,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeMessage => write!(f, "encoding wire message"),
            Self::DecodeMessage => write!(f, "decoding wire message"),
            Self::EncodeIntoBuffer => write!(f, "encoding into buffer"),
            Self::EncodeState => write!(f, "encoding simulation state"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// Messages are kept as `String` because bincode errors only expose a `Display` representation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The provided buffer was too small for encoding.
    BufferTooSmall {
        /// The actual buffer size provided.
        provided: usize,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::BufferTooSmall { provided } => {
                write!(f, "buffer too small: only {provided} bytes provided")
            },
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>`.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::EncodeMessage))
}

/// Encodes simulation state for hashing. Same bytes as [`encode`], different error context.
pub(crate) fn encode_state<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::EncodeState))
}

/// Encodes a value into an existing byte slice and returns the number of bytes written.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if the buffer is not large enough.
///
/// # Examples
///
/// ```
/// use paddle_rollback::network::codec::encode_into;
/// use paddle_rollback::{FrameConfirmation, Frame, PhysicsState};
///
/// let mut buffer = [0u8; 64];
/// let confirmation = FrameConfirmation::new(Frame::new(1), [PhysicsState::ZERO; 2]);
/// let len = encode_into(&confirmation, &mut buffer).expect("encoding should succeed");
/// assert_eq!(len, 12);
/// ```
pub fn encode_into<T: Serialize>(value: &T, buffer: &mut [u8]) -> CodecResult<usize> {
    bincode::serde::encode_into_slice(value, buffer, config()).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("UnexpectedEnd") || msg.contains("not enough") {
            CodecError::BufferTooSmall {
                provided: buffer.len(),
            }
        } else {
            CodecError::encode(msg, CodecOperation::EncodeIntoBuffer)
        }
    })
}

/// Decodes a value from a byte slice, returning it with the number of bytes consumed.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::DecodeMessage))
}

/// Decodes a value from a byte slice, ignoring the bytes consumed.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    decode(bytes).map(|(value, _)| value)
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
    use crate::network::messages::{FrameConfirmation, PlayerInputPacket};
    use crate::{Frame, PhysicsState, PlayerInput, PlayerNumber, MAX_PLAYERS};

    #[test]
    fn confirmation_has_fixed_wire_size() {
        let small = FrameConfirmation::new(Frame::new(1), [PhysicsState::ZERO; MAX_PLAYERS]);
        let large = FrameConfirmation::new(
            Frame::new(u32::MAX),
            [PhysicsState::new(i32::MIN); MAX_PLAYERS],
        );
        let small_bytes = encode(&small).unwrap();
        let large_bytes = encode(&large).unwrap();
        assert_eq!(small_bytes.len(), 4 + 4 * MAX_PLAYERS);
        assert_eq!(small_bytes.len(), large_bytes.len());
    }

    #[test]
    fn confirmation_frame_is_little_endian_u32() {
        let confirmation =
            FrameConfirmation::new(Frame::new(0x0102_0304), [PhysicsState::ZERO; MAX_PLAYERS]);
        let bytes = encode(&confirmation).unwrap();
        assert_eq!(&bytes[..4], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn input_packet_decodes_back() {
        let packet = PlayerInputPacket::new(
            PlayerNumber::new(1),
            Frame::new(40),
            vec![PlayerInput::UP, PlayerInput::DOWN],
        );
        let bytes = encode(&packet).unwrap();
        let decoded: PlayerInputPacket = decode_value(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn encode_into_rejects_small_buffer() {
        let confirmation = FrameConfirmation::new(Frame::new(1), [PhysicsState::ZERO; MAX_PLAYERS]);
        let mut buffer = [0u8; 3];
        let result = encode_into(&confirmation, &mut buffer);
        assert!(matches!(
            result,
            Err(CodecError::BufferTooSmall { .. }) | Err(CodecError::EncodeError { .. })
        ));
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let confirmation = FrameConfirmation::new(Frame::new(9), [PhysicsState::new(5); MAX_PLAYERS]);
        let bytes = encode(&confirmation).unwrap();
        let result: CodecResult<FrameConfirmation> = decode_value(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(CodecError::DecodeError { .. })));
    }

    #[test]
    fn codec_error_display() {
        let err = CodecError::encode("boom", CodecOperation::EncodeState);
        assert!(err.to_string().contains("simulation state"));
        let err = CodecError::BufferTooSmall { provided: 3 };
        assert!(err.to_string().contains("3 bytes"));
    }
}
