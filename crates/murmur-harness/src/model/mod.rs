//! Reference model for model-based testing.
//!
//! The model is a direct restatement of what one chat client must do: who
//! it is, whether it is connected, who is online, and what it sent and
//! received. It serves as the oracle against which the real session is
//! verified.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Observable behavior only: no attempt numbers, timer ids or generations
//! - Deterministic: Same inputs produce same outputs

pub mod operation;
mod session;

pub use operation::{BodyIdx, NameIdx, Operation, OperationError, OperationResult, users_in};
pub use session::{ModelSession, ObservableState};
