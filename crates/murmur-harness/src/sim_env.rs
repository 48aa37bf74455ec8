//! Manually advanced clock.
//!
//! [`SimEnv`] never reads the system clock. Time moves only through
//! [`SimEnv::advance`] or by awaiting [`Environment::sleep`], which jumps the
//! clock forward by the requested duration and completes at once. Clones
//! share one clock.

use std::{
    ops::{Add, Sub},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use murmur_core::env::Environment;

/// Point on the simulated clock, measured from its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the clock started.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Simulation environment with a shared manual clock.
#[derive(Debug, Clone, Default)]
pub struct SimEnv {
    /// Nanoseconds since start.
    clock: Arc<AtomicU64>,
}

impl SimEnv {
    /// Clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        advance(&self.clock, by);
    }

    /// Time since the clock started.
    pub fn elapsed(&self) -> Duration {
        self.now().since_start()
    }
}

fn advance(clock: &AtomicU64, by: Duration) {
    let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
    clock.fetch_add(nanos, Ordering::SeqCst);
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(Duration::from_nanos(self.clock.load(Ordering::SeqCst)))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let clock = Arc::clone(&self.clock);
        async move { advance(&clock, duration) }
    }
}
