//! Fuzz target for wire message deserialization.
//!
//! This target tests that arbitrary bytes cannot crash the message decoder.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary input
//! - Graceful error handling for invalid data
//! - Decoded messages re-encode to the bytes they were read from

#![no_main]

use libfuzzer_sys::fuzz_target;

use paddle_rollback::network::codec;
use paddle_rollback::{FrameConfirmation, PlayerInputPacket};

fuzz_target!(|data: &[u8]| {
    if let Ok((confirmation, read)) = codec::decode::<FrameConfirmation>(data) {
        let encoded = codec::encode(&confirmation).expect("decoded confirmation re-encodes");
        assert_eq!(encoded.as_slice(), &data[..read]);
    }

    if let Ok(packet) = codec::decode_value::<PlayerInputPacket>(data) {
        // Frame iteration must stay in bounds whatever the claimed frame is.
        let _ = packet.frames().count();
        let _serialized = codec::encode(&packet);
    }
});
