//! Match result accumulation.
//!
//! A [`MatchResult`] collects every discrepancy found during a match instead
//! of stopping at the first one, so a failing test can print a complete
//! report. Each retry attempt records into a child result; the child is
//! merged into its parent when the attempt is final and dropped otherwise.

use std::{fmt, time::Duration};

use serde::Serialize;

/// Default overall time budget for a top-level match.
pub const DEFAULT_MATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One expectation that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Item indices from the root menu to the offending item. Empty for the
    /// root menu itself.
    pub location: Vec<usize>,
    /// Human readable description.
    pub message: String,
}

/// Hierarchical accumulator of match failures.
///
/// Carries the overall deadline for the match it belongs to. Children share
/// their parent's deadline.
#[derive(Debug, Clone)]
pub struct MatchResult<I> {
    deadline: I,
    failures: Vec<Failure>,
}

impl<I> MatchResult<I>
where
    I: Copy + Ord,
{
    /// Create an empty result that times out at `deadline`.
    pub fn new(deadline: I) -> Self {
        Self { deadline, failures: Vec::new() }
    }

    /// Create an empty result that times out `timeout` after `now`.
    pub fn with_timeout(now: I, timeout: Duration) -> Self
    where
        I: std::ops::Add<Duration, Output = I>,
    {
        Self::new(now + timeout)
    }

    /// Create an empty child sharing this result's deadline.
    #[must_use]
    pub fn create_child(&self) -> Self {
        Self::new(self.deadline)
    }

    /// Record a failure at `location`.
    pub fn failure(&mut self, location: &[usize], message: impl Into<String>) {
        self.failures.push(Failure { location: location.to_vec(), message: message.into() });
    }

    /// Fold a child's failures into this result.
    pub fn merge(&mut self, child: Self) {
        self.failures.extend(child.failures);
    }

    /// True when no failure has been recorded here or in any merged child.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the overall deadline has passed at `now`.
    #[must_use]
    pub fn has_timed_out(&self, now: I) -> bool {
        now >= self.deadline
    }

    /// Overall deadline.
    #[must_use]
    pub fn deadline(&self) -> I {
        self.deadline
    }

    /// Recorded failures, in the order they were found.
    #[must_use]
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }
}

impl<I> fmt::Display for MatchResult<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return f.write_str("All expectations met");
        }

        f.write_str("Failed expectations:")?;
        for failure in &self.failures {
            write!(f, "\n  {:?} {}", failure.location, failure.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::env::{Environment, SystemEnv};

    #[test]
    fn empty_result_is_success() {
        let result = MatchResult::new(SystemEnv.now());
        assert!(result.success());
        assert_eq!(result.to_string(), "All expectations met");
    }

    #[test]
    fn merged_child_failures_propagate() {
        let t0 = SystemEnv.now();
        let mut parent = MatchResult::with_timeout(t0, DEFAULT_MATCH_TIMEOUT);

        let mut child = parent.create_child();
        child.failure(&[1, 0], "Expected label 'Mute' but found 'Volume'");
        assert_eq!(child.deadline(), parent.deadline());

        parent.merge(child);

        assert!(!parent.success());
        assert_eq!(parent.failures()[0].location, vec![1, 0]);
        assert_eq!(
            parent.to_string(),
            "Failed expectations:\n  [1, 0] Expected label 'Mute' but found 'Volume'"
        );
    }

    #[test]
    fn timeout_is_inclusive() {
        let t0 = SystemEnv.now();
        let result = MatchResult::with_timeout(t0, Duration::from_secs(10));

        assert!(!result.has_timed_out(t0));
        assert!(!result.has_timed_out(t0 + Duration::from_secs(9)));
        assert!(result.has_timed_out(t0 + Duration::from_secs(10)));
        assert!(result.has_timed_out(t0 + Duration::from_secs(11)));
    }

    proptest! {
        #[test]
        fn success_iff_no_failures(failures in prop::collection::vec(
            (prop::collection::vec(0usize..8, 0..4), "[a-z ]{0,12}"),
            0..6,
        )) {
            let mut parent = MatchResult::new(0u64);
            let mut child = parent.create_child();
            for (location, message) in &failures {
                child.failure(location, message.clone());
            }
            parent.merge(child);

            prop_assert_eq!(parent.success(), failures.is_empty());
            prop_assert_eq!(parent.failures().len(), failures.len());
        }
    }
}
