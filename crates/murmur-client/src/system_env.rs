//! Production Environment implementation.
//!
//! `SystemEnv` reads tokio's clock rather than `std::time::Instant` so the
//! instants the state machines compare and the timers the driver sleeps on
//! come from the same source. Under a paused runtime (tests) or a turmoil
//! host both move together.

use std::time::Duration;

use murmur_core::env::Environment;
use tokio::time::Instant;

/// Production environment backed by the tokio clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
