//! Consecutive-failure ceilings.
//!
//! The daemon keeps two independent counters: one for connection attempts,
//! whose ceiling is configurable, and one for batch reads inside a session,
//! which tolerates 10 failures unless configured otherwise. Both reset on
//! any success. Keeping the ceiling in a [`RetryPolicy`] makes the two
//! thresholds explicit values instead of literals in the loops.

/// A ceiling on consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures tolerated before giving up; 0 means never give up.
    max_failures: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::read_errors()
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_failures: u32) -> Self {
        Self { max_failures }
    }

    /// A policy that never gives up.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self::new(0)
    }

    /// The poller's default read-error tolerance.
    ///
    /// Default: 10 failures
    #[must_use]
    pub const fn read_errors() -> Self {
        Self::new(10)
    }

    #[must_use]
    pub const fn max_failures(&self) -> u32 {
        self.max_failures
    }

    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.max_failures == 0
    }

    /// Check whether `failures` consecutive failures exceed the ceiling.
    ///
    /// Reaching the ceiling is still tolerated; only going past it is not.
    #[must_use]
    pub const fn is_exceeded_by(&self, failures: u32) -> bool {
        !self.is_unlimited() && failures > self.max_failures
    }
}

/// Running count of consecutive failures under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryCounter {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryCounter {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Count one more failure, returning the new total.
    pub const fn record_failure(&mut self) -> u32 {
        self.failures = self.failures.saturating_add(1);
        self.failures
    }

    /// Forget every failure so far.
    pub const fn reset(&mut self) {
        self.failures = 0;
    }

    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Has the current run of failures gone past the ceiling?
    #[must_use]
    pub const fn exceeded(&self) -> bool {
        self.policy.is_exceeded_by(self.failures)
    }
}
