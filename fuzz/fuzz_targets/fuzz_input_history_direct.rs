//! Direct fuzz target for InputHistory.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary operation sequences
//! - Invariant preservation after every operation
//! - The current frame never moves backward
//! - Real input written for a frame is read back while it is in the history

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use paddle_rollback::telemetry::InvariantChecker;
use paddle_rollback::{Frame, InputHistory, PlayerInput, PlayerNumber};

#[derive(Debug, Arbitrary)]
enum HistoryOp {
    SetInput { player: u8, frame: u16, bits: u8 },
    StartNewFrame { frame: u16 },
    ReadInput { player: u8, frame: u16 },
    FirstPlayerMissing { frame: u16 },
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    length: u8,
    operations: Vec<HistoryOp>,
}

fuzz_target!(|fuzz_input: FuzzInput| {
    // Clamp length to [2, 257]
    let length = usize::from(fuzz_input.length) + 2;
    let Some(mut history) = InputHistory::with_length(length) else {
        return;
    };

    for op in fuzz_input.operations.into_iter().take(1000) {
        let before = history.current_frame();
        match op {
            HistoryOp::SetInput {
                player,
                frame,
                bits,
            } => {
                let player = PlayerNumber::new(player % 3);
                let frame = Frame::new(u32::from(frame));
                let input = PlayerInput::from_bits(bits);
                if history.set_input(player, input, frame).is_ok() {
                    assert_eq!(history.input(player, frame).ok(), Some(input));
                }
            },
            HistoryOp::StartNewFrame { frame } => {
                history.start_new_frame(Frame::new(u32::from(frame)));
            },
            HistoryOp::ReadInput { player, frame } => {
                let _ = history.input(PlayerNumber::new(player % 3), Frame::new(u32::from(frame)));
            },
            HistoryOp::FirstPlayerMissing { frame } => {
                let _ = history.first_player_missing(Frame::new(u32::from(frame)));
            },
        }
        assert!(history.current_frame() >= before);
        assert!(history.check_invariants().is_ok());
    }
});
