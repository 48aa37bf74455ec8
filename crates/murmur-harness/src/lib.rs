//! Deterministic simulation harness for Murmur client testing.
//!
//! Turmoil-backed implementations of the client's transport and status
//! seams, a manual clock, and a synchronous fake driver for the session
//! state machine.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and a [`SessionWorld`],
//! and their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod sim_env;
pub mod sim_transport;
pub mod world;

pub use model::{
    BodyIdx, ModelSession, NameIdx, ObservableState, Operation, OperationError, OperationResult,
};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_transport::{ScriptedStatus, SimConnector};
pub use world::SessionWorld;
