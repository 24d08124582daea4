//! Environment abstraction for deterministic testing.
//!
//! Decouples the retry loop from the system clock. The matcher only ever asks
//! the environment for the current instant, so simulation can drive it with a
//! virtual clock while production uses [`SystemEnv`].

use std::{
    fmt,
    ops::{Add, Sub},
    time::Duration,
};

/// Abstract environment providing time.
///
/// # Invariants
///
/// - `now()` never goes backwards within a single execution context
/// - Subtracting an earlier instant from a later one yields the elapsed time;
///   the reverse saturates to zero
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + fmt::Debug
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;
}

/// Production environment reading the real monotonic clock.
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
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }
}
