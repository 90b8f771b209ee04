//! Property-based tests for the input history and the rollback manager.
//!
//! # Properties Tested
//!
//! ## InputHistory
//! - Shifting by `delta` moves offset `i` to `i + delta` and fills `0..delta` with the former
//!   newest input.
//! - Inputs written for a frame are read back for that frame until they leave the history.
//! - The first input past the last received frame predicts every later frame.
//!
//! ## RollbackManager
//! - Identical input streams produce identical tracks on independent instances.
//! - The arrival order of inputs does not change the result.
//! - The last validated frame never decreases.
//! - Resimulating without new input is idempotent.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use glam::Vec2;
use paddle_rollback::telemetry::InvariantChecker;
use paddle_rollback::{
    Frame, GameConfig, InputHistory, PlayerInput, PlayerNumber, RollbackManager,
};
use proptest::prelude::*;

const P0: PlayerNumber = PlayerNumber::new(0);
const P1: PlayerNumber = PlayerNumber::new(1);

// ============================================================================
// Property Test Strategies
// ============================================================================

fn input_strategy() -> impl Strategy<Value = PlayerInput> {
    (0u8..4).prop_map(PlayerInput::from_bits)
}

fn inputs_strategy(max_frames: usize) -> impl Strategy<Value = Vec<(PlayerInput, PlayerInput)>> {
    prop::collection::vec((input_strategy(), input_strategy()), 1..max_frames)
}

fn history_length_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![Just(2usize), Just(16), Just(128)]
}

fn manager() -> RollbackManager {
    let mut manager = RollbackManager::new(GameConfig::default()).unwrap();
    manager.spawn_player(P0, Vec2::new(1.0, 0.0), 0.0).unwrap();
    manager.spawn_player(P1, Vec2::new(-1.0, 0.0), 180.0).unwrap();
    manager.spawn_ball(Vec2::ZERO, Vec2::new(1.0, 0.7));
    manager
}

fn feed_in_order(manager: &mut RollbackManager, inputs: &[(PlayerInput, PlayerInput)]) {
    for (index, (first, second)) in inputs.iter().enumerate() {
        let frame = Frame::new(index as u32 + 1);
        manager.set_player_input(P0, *first, frame).unwrap();
        manager.set_player_input(P1, *second, frame).unwrap();
        manager.simulate_to_current_frame();
    }
}

// ============================================================================
// InputHistory Properties
// ============================================================================

proptest! {
    #[test]
    fn shift_moves_every_entry(
        length in history_length_strategy(),
        writes in prop::collection::vec(input_strategy(), 1..40),
        delta in 1u32..200,
    ) {
        let mut history = InputHistory::with_length(length).unwrap();
        for (index, input) in writes.iter().enumerate() {
            history.set_input(P0, *input, Frame::new(index as u32 + 1)).unwrap();
        }
        let before: Vec<PlayerInput> = history.inputs(P0).collect();
        let newest = before[0];

        let target = history.current_frame() + delta;
        history.start_new_frame(target);
        let after: Vec<PlayerInput> = history.inputs(P0).collect();

        prop_assert_eq!(after.len(), length);
        prop_assert_eq!(history.current_frame(), target);
        for (offset, input) in after.iter().enumerate() {
            if offset < delta as usize {
                prop_assert_eq!(*input, newest);
            } else {
                prop_assert_eq!(*input, before[offset - delta as usize]);
            }
        }
    }

    #[test]
    fn written_inputs_are_read_back(
        length in history_length_strategy(),
        writes in prop::collection::vec(input_strategy(), 1..300),
    ) {
        let mut history = InputHistory::with_length(length).unwrap();
        for (index, input) in writes.iter().enumerate() {
            history.set_input(P1, *input, Frame::new(index as u32 + 1)).unwrap();
        }
        let current = history.current_frame();
        prop_assert_eq!(current.as_u32() as usize, writes.len());
        prop_assert_eq!(history.last_received(P1), current);
        for (index, input) in writes.iter().enumerate() {
            let frame = Frame::new(index as u32 + 1);
            if frame >= history.oldest_frame() {
                prop_assert_eq!(history.input(P1, frame).unwrap(), *input);
            } else {
                prop_assert!(history.input(P1, frame).is_err());
            }
        }
        prop_assert!(history.check_invariants().is_ok());
    }

    #[test]
    fn first_input_predicts_later_frames(
        ahead in 1u32..100,
        received in 1u32..100,
        input in input_strategy(),
    ) {
        let mut history = InputHistory::new();
        let current = Frame::new(received + ahead);
        history.start_new_frame(current);
        history.set_input(P0, input, Frame::new(received)).unwrap();
        for frame in history.oldest_frame().as_u32().max(1)..=current.as_u32() {
            prop_assert_eq!(history.input(P0, Frame::new(frame)).unwrap(), input);
        }
        prop_assert_eq!(history.last_received(P0), Frame::new(received));
    }
}

// ============================================================================
// RollbackManager Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn identical_streams_give_identical_tracks(inputs in inputs_strategy(60)) {
        let mut first = manager();
        let mut second = manager();
        feed_in_order(&mut first, &inputs);
        feed_in_order(&mut second, &inputs);
        prop_assert_eq!(first.current_track(), second.current_track());

        let last = Frame::new(inputs.len() as u32);
        first.validate_frame(last).unwrap();
        second.validate_frame(last).unwrap();
        prop_assert_eq!(first.validated_physics_states(), second.validated_physics_states());
    }

    #[test]
    fn arrival_order_does_not_matter(inputs in inputs_strategy(60)) {
        let mut in_order = manager();
        feed_in_order(&mut in_order, &inputs);

        // Player 0 runs ahead alone, player 1's inputs arrive in one burst.
        let mut bursty = manager();
        for (index, (first, _)) in inputs.iter().enumerate() {
            bursty.set_player_input(P0, *first, Frame::new(index as u32 + 1)).unwrap();
            bursty.simulate_to_current_frame();
        }
        for (index, (_, second)) in inputs.iter().enumerate() {
            bursty.set_player_input(P1, *second, Frame::new(index as u32 + 1)).unwrap();
        }
        bursty.simulate_to_current_frame();

        prop_assert_eq!(in_order.current_track(), bursty.current_track());
    }

    #[test]
    fn validated_frame_is_monotonic(
        inputs in inputs_strategy(60),
        requests in prop::collection::vec(0u32..80, 1..20),
    ) {
        let mut manager = manager();
        feed_in_order(&mut manager, &inputs);
        let current = manager.current_frame();

        let mut previous = manager.last_validate_frame();
        for request in requests {
            let frame = Frame::new(request);
            let result = manager.validate_frame(frame);
            if frame > current {
                prop_assert!(result.is_err());
            } else {
                prop_assert!(result.is_ok());
            }
            let now = manager.last_validate_frame();
            prop_assert!(now >= previous);
            prop_assert!(now <= current);
            previous = now;
        }
        prop_assert!(manager.check_invariants().is_ok());
    }

    #[test]
    fn resimulation_is_idempotent(inputs in inputs_strategy(60), validate_at in 0usize..60) {
        let mut manager = manager();
        feed_in_order(&mut manager, &inputs);
        let frame = Frame::new(validate_at.min(inputs.len()) as u32);
        manager.validate_frame(frame).unwrap();

        manager.simulate_to_current_frame();
        let once = manager.current_track().clone();
        manager.simulate_to_current_frame();
        prop_assert_eq!(manager.current_track(), &once);
    }
}
