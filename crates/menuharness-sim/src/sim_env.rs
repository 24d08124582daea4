//! Virtual clock environment.
//!
//! `SimEnv` implements [`Environment`] with a shared virtual clock that only
//! moves when something advances it: a test calling [`SimEnv::advance`] or a
//! simulated menu mirror waiting for a change. Retry loops with 20 second
//! timers run instantly and reproducibly.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use menuharness_core::Environment;

/// Instant on the virtual clock, measured from the clock's creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time elapsed since the clock started.
    #[must_use]
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }
}

/// Simulation environment with a shared virtual clock.
///
/// Clones share the same clock.
#[derive(Debug, Clone, Default)]
pub struct SimEnv {
    clock: Arc<Mutex<SimInstant>>,
}

impl SimEnv {
    /// Create a clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *now = *now + duration;
    }

    /// Move the clock to `instant`. Never moves it backwards.
    pub fn advance_to(&self, instant: SimInstant) {
        let mut now = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *now = (*now).max(instant);
    }

    /// Time elapsed since the clock started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.now().since_start()
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_moves_when_advanced() {
        let env = SimEnv::new();
        let t0 = env.now();

        assert_eq!(env.now(), t0);

        env.advance(Duration::from_secs(20));
        assert_eq!(env.now() - t0, Duration::from_secs(20));
    }

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::new();
        let other = env.clone();

        other.advance(Duration::from_millis(250));

        assert_eq!(env.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn advance_to_never_goes_backwards() {
        let env = SimEnv::new();
        env.advance(Duration::from_secs(5));

        env.advance_to(SimInstant::default() + Duration::from_secs(2));
        assert_eq!(env.elapsed(), Duration::from_secs(5));

        env.advance_to(SimInstant::default() + Duration::from_secs(7));
        assert_eq!(env.elapsed(), Duration::from_secs(7));
    }

    #[test]
    fn subtraction_saturates() {
        let early = SimInstant::default();
        let late = early + Duration::from_secs(1);

        assert_eq!(early - late, Duration::ZERO);
    }
}
