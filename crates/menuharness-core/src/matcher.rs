//! Menu matcher and its retry loop.
//!
//! Menus published over a bus are eventually consistent: a snapshot taken too
//! early shows a partial tree. The matcher therefore compares repeatedly,
//! waiting for change notifications between attempts, until the menu matches
//! or the overall deadline carried by the [`MatchResult`] passes.
//!
//! A second, rolling deadline guards against a known publisher race where the
//! very first mirror stays stale forever. When it fires, the session is
//! rebuilt from scratch. This is a liveness aid, not a correctness guarantee.
//!
//! # State Machine
//!
//! ```text
//!            ┌─────────┐  attempt   ┌───────┐  success / gave up  ┌──────┐
//!    ┌──────>│ Attempt │───────────>│ Check │────────────────────>│ Done │
//!    │       └─────────┘            └───────┘                     └──────┘
//!    │                               │     │
//!    │                  reconnect    │     │ retry
//!    │                  deadline     ↓     │
//!    │                         ┌─────────┐ │
//!    │                         │ Rebuild │ │
//!    │                         └─────────┘ │
//!    │                               │     │
//!    │        ┌───────────┐          │     │
//!    └────────│ RetryWait │<─────────┴─────┘
//!             └───────────┘
//! ```
//!
//! [`MatchLoop`] holds only the transition logic; time is passed in. The
//! [`MenuMatcher`] drives it and performs the actual comparisons, rebuilds
//! and waits.

use std::{fmt, ops::Add, time::Duration};

use crate::{
    env::Environment,
    error::ConnectionError,
    item::ItemMatcher,
    params::ConnectionParameters,
    result::{DEFAULT_MATCH_TIMEOUT, MatchResult},
    session::{RemoteMenuSession, Transport},
};

/// Time after which a persistently failing match rebuilds its session.
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Longest single wait for a change notification between attempts.
pub const DEFAULT_CHANGE_TIMEOUT: Duration = Duration::from_millis(100);

/// Floor applied to [`MatcherConfig::change_timeout`] so every retry wait lets
/// time pass.
pub const MIN_CHANGE_TIMEOUT: Duration = Duration::from_millis(1);

/// Matcher configuration.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Rolling deadline for rebuilding the session while mismatched
    pub reconnect_timeout: Duration,
    /// Bound on each wait for a change notification. Values below
    /// [`MIN_CHANGE_TIMEOUT`] are raised to it.
    pub change_timeout: Duration,
    /// Overall budget of results created by [`MenuMatcher::match_menu`]
    pub match_timeout: Duration,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            change_timeout: DEFAULT_CHANGE_TIMEOUT,
            match_timeout: DEFAULT_MATCH_TIMEOUT,
        }
    }
}

/// How a finished match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The last attempt found no discrepancies
    Matched,
    /// The overall deadline passed; the last attempt's failures were kept
    GaveUp,
}

/// Retry loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// Compare the remote menu against the matchers
    Attempt,
    /// Decide what to do with the attempt's result
    Check {
        /// Whether the attempt found no discrepancies
        success: bool,
    },
    /// Rebuild the session to escape a stale mirror
    Rebuild,
    /// Wait for the remote menu to change
    RetryWait,
    /// Terminal
    Done(MatchOutcome),
}

/// Pure transition logic of the retry loop.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct MatchLoop<I> {
    state: MatchState,
    reconnect_timeout: Duration,
    reconnect_deadline: I,
    attempts: u32,
    rebuilds: u32,
}

impl<I> MatchLoop<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Start a loop in [`MatchState::Attempt`] at `now`.
    pub fn new(now: I, reconnect_timeout: Duration) -> Self {
        Self {
            state: MatchState::Attempt,
            reconnect_timeout,
            reconnect_deadline: now + reconnect_timeout,
            attempts: 0,
            rebuilds: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MatchState {
        self.state
    }

    /// Attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Rebuilds performed so far.
    #[must_use]
    pub fn rebuilds(&self) -> u32 {
        self.rebuilds
    }

    /// Instant at which the next rebuild becomes due.
    #[must_use]
    pub fn reconnect_deadline(&self) -> I {
        self.reconnect_deadline
    }

    /// `Attempt` → `Check`.
    pub fn attempted(&mut self, success: bool) {
        debug_assert_eq!(self.state, MatchState::Attempt);

        self.attempts += 1;
        self.state = MatchState::Check { success };
    }

    /// `Check` → `Done`, `Rebuild` or `RetryWait`.
    ///
    /// `timed_out` is whether the overall deadline has passed at `now`.
    pub fn check(&mut self, now: I, timed_out: bool) -> MatchState {
        debug_assert!(matches!(self.state, MatchState::Check { .. }));
        let MatchState::Check { success } = self.state else {
            return self.state;
        };

        self.state = if success {
            MatchState::Done(MatchOutcome::Matched)
        } else if now >= self.reconnect_deadline {
            MatchState::Rebuild
        } else if timed_out {
            MatchState::Done(MatchOutcome::GaveUp)
        } else {
            MatchState::RetryWait
        };
        self.state
    }

    /// `Rebuild` → `RetryWait`, resetting the rolling deadline from `now`.
    pub fn rebuilt(&mut self, now: I) {
        debug_assert_eq!(self.state, MatchState::Rebuild);

        self.rebuilds += 1;
        self.reconnect_deadline = now + self.reconnect_timeout;
        self.state = MatchState::RetryWait;
    }

    /// `RetryWait` → `Attempt`.
    pub fn waited(&mut self) {
        debug_assert_eq!(self.state, MatchState::RetryWait);

        self.state = MatchState::Attempt;
    }
}

/// Matches a remote menu against an ordered list of item matchers.
///
/// # Type Parameters
///
/// - `T`: bus transport the session is built on
/// - `E`: environment providing the clock
pub struct MenuMatcher<T, E>
where
    T: Transport,
    E: Environment,
{
    env: E,
    config: MatcherConfig,
    session: RemoteMenuSession<T>,
    items: Vec<Box<dyn ItemMatcher<E::Instant>>>,
}

impl<T, E> MenuMatcher<T, E>
where
    T: Transport,
    E: Environment,
{
    /// Connect to the menu described by `parameters` with default
    /// configuration.
    pub fn new(parameters: ConnectionParameters, transport: T, env: E) -> Result<Self, ConnectionError> {
        Self::with_config(parameters, transport, env, MatcherConfig::default())
    }

    /// Connect to the menu described by `parameters`.
    pub fn with_config(
        parameters: ConnectionParameters,
        transport: T,
        env: E,
        config: MatcherConfig,
    ) -> Result<Self, ConnectionError> {
        let session = RemoteMenuSession::open(transport, parameters)?;
        Ok(Self { env, config, session, items: Vec::new() })
    }

    /// Append the matcher for the next menu item.
    ///
    /// Not validated here; a count mismatch is reported when matching.
    #[must_use]
    pub fn item(mut self, matcher: impl ItemMatcher<E::Instant> + 'static) -> Self {
        self.items.push(Box::new(matcher));
        self
    }

    /// Underlying session.
    #[must_use]
    pub fn session(&self) -> &RemoteMenuSession<T> {
        &self.session
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match with a fresh result that times out after
    /// [`MatcherConfig::match_timeout`].
    pub fn match_menu(&mut self) -> Result<MatchResult<E::Instant>, ConnectionError> {
        let mut result = MatchResult::with_timeout(self.env.now(), self.config.match_timeout);
        self.match_into(&mut result)?;
        Ok(result)
    }

    /// Retry until the menu matches or `result` times out, then merge the
    /// last attempt into `result`.
    ///
    /// Only session rebuild failures are errors; mismatches end up in
    /// `result`.
    pub fn match_into(&mut self, result: &mut MatchResult<E::Instant>) -> Result<(), ConnectionError> {
        let mut machine = MatchLoop::new(self.env.now(), self.config.reconnect_timeout);
        let mut last_attempt = None;

        loop {
            match machine.state() {
                MatchState::Attempt => {
                    let child = self.attempt(result);
                    machine.attempted(child.success());
                    last_attempt = Some(child);
                },
                MatchState::Check { .. } => {
                    let now = self.env.now();
                    machine.check(now, result.has_timed_out(now));
                },
                MatchState::Rebuild => {
                    tracing::info!(
                        attempts = machine.attempts(),
                        "menu still mismatched, recreating session"
                    );
                    self.session.rebuild()?;
                    machine.rebuilt(self.env.now());
                },
                MatchState::RetryWait => {
                    if let Some(child) = &last_attempt {
                        tracing::debug!(
                            attempt = machine.attempts(),
                            failures = child.failures().len(),
                            "menu mismatch, waiting for change"
                        );
                    }
                    let remaining = result.deadline() - self.env.now();
                    self.session.menu().wait_for_change(retry_wait(&self.config, remaining));
                    machine.waited();
                },
                MatchState::Done(outcome) => {
                    if outcome == MatchOutcome::GaveUp {
                        tracing::warn!(
                            attempts = machine.attempts(),
                            rebuilds = machine.rebuilds(),
                            "menu did not match before the deadline"
                        );
                    }
                    if let Some(child) = last_attempt.take() {
                        result.merge(child);
                    }
                    return Ok(());
                },
            }
        }
    }

    /// Compare the current snapshot once.
    fn attempt(&self, parent: &MatchResult<E::Instant>) -> MatchResult<E::Instant> {
        let mut child = parent.create_child();
        let location: &[usize] = &[];

        let menu = self.session.menu();
        let found = menu.item_count();
        if self.items.len() > found {
            child.failure(
                location,
                format!("Row count mismatch, expected {} but found {found}", self.items.len()),
            );
            return child;
        }

        for (index, matcher) in self.items.iter().enumerate() {
            matcher.match_item(&mut child, location, menu, self.session.actions(), index);
        }
        child
    }
}

impl<T, E> fmt::Debug for MenuMatcher<T, E>
where
    T: Transport,
    E: Environment,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuMatcher")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("items", &self.items.len())
            .finish_non_exhaustive()
    }
}

/// Length of one change wait with `remaining` left before the overall
/// deadline.
fn retry_wait(config: &MatcherConfig, remaining: Duration) -> Duration {
    config.change_timeout.max(MIN_CHANGE_TIMEOUT).min(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SystemEnv;

    const RECONNECT: Duration = DEFAULT_RECONNECT_TIMEOUT;

    #[test]
    fn retry_wait_has_a_floor_and_respects_deadline() {
        let zero = MatcherConfig { change_timeout: Duration::ZERO, ..MatcherConfig::default() };
        assert_eq!(retry_wait(&zero, Duration::from_secs(1)), MIN_CHANGE_TIMEOUT);

        let config = MatcherConfig::default();
        assert_eq!(retry_wait(&config, Duration::from_secs(1)), DEFAULT_CHANGE_TIMEOUT);
        assert_eq!(retry_wait(&config, Duration::from_millis(30)), Duration::from_millis(30));
    }

    #[test]
    fn success_finishes_immediately() {
        let t0 = SystemEnv.now();
        let mut machine = MatchLoop::new(t0, RECONNECT);

        assert_eq!(machine.state(), MatchState::Attempt);
        machine.attempted(true);
        assert_eq!(machine.check(t0, false), MatchState::Done(MatchOutcome::Matched));
        assert_eq!(machine.attempts(), 1);
    }

    #[test]
    fn success_wins_over_expired_deadlines() {
        let t0 = SystemEnv.now();
        let mut machine = MatchLoop::new(t0, RECONNECT);

        machine.attempted(true);
        let late = t0 + RECONNECT + Duration::from_secs(1);
        assert_eq!(machine.check(late, true), MatchState::Done(MatchOutcome::Matched));
    }

    #[test]
    fn failure_before_deadlines_waits() {
        let t0 = SystemEnv.now();
        let mut machine = MatchLoop::new(t0, RECONNECT);

        machine.attempted(false);
        assert_eq!(machine.check(t0 + Duration::from_secs(1), false), MatchState::RetryWait);
        machine.waited();
        assert_eq!(machine.state(), MatchState::Attempt);
    }

    #[test]
    fn failure_after_overall_deadline_gives_up() {
        let t0 = SystemEnv.now();
        let mut machine = MatchLoop::new(t0, RECONNECT);

        machine.attempted(false);
        assert_eq!(
            machine.check(t0 + Duration::from_secs(10), true),
            MatchState::Done(MatchOutcome::GaveUp)
        );
    }

    #[test]
    fn reconnect_deadline_takes_precedence_and_rolls() {
        let t0 = SystemEnv.now();
        let mut machine = MatchLoop::new(t0, RECONNECT);

        machine.attempted(false);
        let t20 = t0 + RECONNECT;
        assert_eq!(machine.check(t20, true), MatchState::Rebuild);

        machine.rebuilt(t20);
        assert_eq!(machine.state(), MatchState::RetryWait);
        assert_eq!(machine.rebuilds(), 1);
        assert_eq!(machine.reconnect_deadline(), t20 + RECONNECT);

        // Deadline rolled forward, so the next failure only waits
        machine.waited();
        machine.attempted(false);
        assert_eq!(machine.check(t20 + Duration::from_secs(1), false), MatchState::RetryWait);
    }
}
