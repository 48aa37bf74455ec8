//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! session behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!     ModelSession   SessionWorld     Compare
//!     (reference)    (real session)   Results
//! ```

use murmur_core::ConnectionState;
use murmur_harness::{
    BodyIdx, ModelSession, NameIdx, Operation, OperationError, OperationResult, SessionWorld,
};
use proptest::prelude::*;

/// Strategy for generating operations.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    let name = any::<u8>().prop_map(NameIdx);
    let body = any::<u8>().prop_map(BodyIdx);

    prop_oneof![
        // Weight towards the transport events that drive the state machine
        2 => name.clone().prop_map(|name| Operation::Login { name }),
        2 => (name, body.clone())
            .prop_map(|(target, body)| Operation::SendDirect { target, body }),
        2 => body.prop_map(|body| Operation::SendBroadcast { body }),
        1 => Just(Operation::Logout),
        4 => Just(Operation::ServerAccept),
        2 => Just(Operation::ServerLine),
        2 => Just(Operation::SocketError),
        3 => Just(Operation::SocketClose),
        2 => any::<u8>().prop_map(|users| Operation::StatusResponse { users }),
        1 => Just(Operation::StatusFailure),
        4 => (0..1500u16).prop_map(|millis| Operation::AdvanceTime { millis }),
    ]
}

proptest! {
    /// Verify that operation results and observable state match between the
    /// model and the real session.
    ///
    /// This is the core model-based test. Timers in the real world race
    /// under `seed`; the model has no timers at all.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..80)
    ) {
        let mut model = ModelSession::new();
        let mut real = SessionWorld::with_seed(seed);

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(op);
            let real_result = real.apply(op);

            prop_assert_eq!(
                &model_result,
                &real_result,
                "Divergence at operation {}: {:?}",
                i, op
            );
            prop_assert_eq!(
                model.observable_state(),
                real.observable_state(),
                "State divergence after operation {}: {:?}",
                i, op
            );
            if let Err(violation) = real.check_invariants() {
                prop_assert!(false, "Invariant broken after operation {}: {:?}: {}", i, op, violation);
            }
        }
    }

    /// Verify that the bound identity never changes once set.
    #[test]
    fn prop_identity_is_immutable(
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        let mut real = SessionWorld::new();
        let mut bound: Option<String> = None;

        for op in &ops {
            let _ = real.apply(op);
            let identity = real.observable_state().identity;
            match (&bound, identity) {
                (None, Some(identity)) => bound = Some(identity),
                (Some(first), current) => {
                    prop_assert_eq!(Some(first.clone()), current, "identity changed on {:?}", op);
                },
                (None, None) => {},
            }
        }
    }

    /// Verify that nothing reaches the wire unless the connection is open.
    #[test]
    fn prop_sends_require_connection(
        ops in prop::collection::vec(operation_strategy(), 0..60),
        body in any::<u8>().prop_map(BodyIdx)
    ) {
        let mut real = SessionWorld::new();
        for op in &ops {
            let _ = real.apply(op);
        }

        let before = real.observable_state();
        let result = real.apply(&Operation::SendBroadcast { body });
        let after = real.observable_state();

        if result.is_ok() && before.state != ConnectionState::Connected {
            prop_assert_eq!(before.sent, after.sent, "sent while {:?}", before.state);
        }
    }
}

#[cfg(test)]
mod smoke_tests {
    use super::*;

    /// Walk one session through connect, drop, reconnect and logout.
    #[test]
    fn session_lifecycle() {
        let mut model = ModelSession::new();
        let mut real = SessionWorld::new();

        let script = [
            Operation::Login { name: NameIdx(0) },
            Operation::ServerAccept,
            Operation::SendDirect { target: NameIdx(1), body: BodyIdx(1) },
            Operation::StatusResponse { users: 0b111 },
            Operation::SocketClose,
            Operation::SendBroadcast { body: BodyIdx(0) },
            Operation::AdvanceTime { millis: 1000 },
            Operation::ServerAccept,
            Operation::SendBroadcast { body: BodyIdx(2) },
            Operation::Logout,
            Operation::AdvanceTime { millis: 5000 },
        ];
        for op in &script {
            assert_eq!(model.apply(op), real.apply(op), "{op:?}");
        }

        let state = real.observable_state();
        assert_eq!(state, model.observable_state());
        assert_eq!(state.state, ConnectionState::Disconnected);
        assert_eq!(state.sent, ["@bob see you at 5", "@bob psst"]);
        assert_eq!(state.roster, ["alice", "bob", "carol"]);
        assert_eq!(real.check_invariants(), Ok(()));
    }

    /// Blank names are rejected before anything else happens.
    #[test]
    fn blank_login_rejected() {
        let mut real = SessionWorld::new();
        let result = real.apply(&Operation::Login { name: NameIdx(4) });

        assert_eq!(result, OperationResult::Error(OperationError::InvalidIdentity));
        assert_eq!(real.observable_state().state, ConnectionState::Disconnected);
        assert!(real.observable_state().identity.is_none());
    }
}
