//! Fuzz target for the [`Session`] state machine
//!
//! Drive one session through arbitrary interleavings of user requests,
//! socket events, status answers and time, with racing timers.
//!
//! # Invariants
//!
//! - The real session agrees with the reference model after every step
//! - At most one socket is live and at most one reconnect timer pending
//! - A pending reconnect exists exactly while `Reconnecting`
//! - `Connected` only with an opened socket
//! - Identity never changes once bound
//! - NEVER panic on any event order
//!
//! [`Session`]: murmur_core::Session

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use murmur_harness::{ModelSession, Operation, SessionWorld};

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    ops: Vec<Operation>,
}

fuzz_target!(|input: Input| {
    let mut model = ModelSession::new();
    let mut real = SessionWorld::with_seed(input.seed);

    for (i, op) in input.ops.iter().enumerate() {
        let model_result = model.apply(op);
        let real_result = real.apply(op);
        assert_eq!(model_result, real_result, "result divergence at {i}: {op:?}");
        assert_eq!(
            model.observable_state(),
            real.observable_state(),
            "state divergence at {i}: {op:?}"
        );
        if let Err(violation) = real.check_invariants() {
            panic!("invariant broken at {i}: {op:?}: {violation}");
        }
    }
});
