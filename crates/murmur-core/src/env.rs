//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the session state machines from the
//! system clock and the async timer primitive. Production code runs against
//! the wall clock and tokio timers; the simulation harness substitutes a
//! manual or virtual clock without touching the state machines.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Isolation: Implementations must not share global state

use std::{
    fmt::Debug,
    ops::{Add, Sub},
    time::Duration,
};

/// A point in time as seen by an [`Environment`].
///
/// Blanket-implemented for any type with instant-like arithmetic, so both
/// `std::time::Instant` and simulated instants qualify.
pub trait Timestamp:
    Copy + Ord + Debug + Send + Sync + Add<Duration, Output = Self> + Sub<Output = Duration> + 'static
{
}

impl<T> Timestamp for T where
    T: Copy
        + Ord
        + Debug
        + Send
        + Sync
        + Add<Duration, Output = T>
        + Sub<Output = Duration>
        + 'static
{
}

/// Abstract environment providing time and the async sleep primitive.
///
/// State machines only ever call [`Environment::now`]. The driver uses
/// [`Environment::sleep`] to realise scheduled timers.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type produced by this environment.
    type Instant: Timestamp;

    /// Returns the current time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: Subsequent calls must return times >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not state machine logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}
