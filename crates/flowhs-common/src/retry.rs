//! Bounded per-command retry policy.

use thiserror::Error;

/// Outcome of applying the retry policy to a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-dispatch the command; `attempt` is the 1-based retry number.
    Retry { attempt: u32 },
    /// The command has used all its retries and fails permanently.
    Exhausted { retries: u32 },
}

/// Error returned for an unusable retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Retry limit must be positive, got {0}")]
pub struct InvalidRetryLimit(pub u32);

/// Bounds how many times one command is re-dispatched.
///
/// A command may be retried `limit` times; the `limit + 1`-th failure is
/// terminal. The bound is on the number of attempts, never on elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    limit: u32,
}

impl RetryPolicy {
    /// Retry limit used when none is configured.
    pub const DEFAULT_LIMIT: u32 = 3;

    /// Creates a policy with the given positive retry limit.
    pub fn new(limit: u32) -> Result<Self, InvalidRetryLimit> {
        if limit == 0 {
            return Err(InvalidRetryLimit(limit));
        }
        Ok(Self { limit })
    }

    /// Returns the configured retry limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Decides what to do with a command that has already been retried
    /// `retries_so_far` times and just failed again.
    pub fn decide(&self, retries_so_far: u32) -> RetryDecision {
        if retries_so_far < self.limit {
            RetryDecision::Retry {
                attempt: retries_so_far + 1,
            }
        } else {
            RetryDecision::Exhausted {
                retries: retries_so_far,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_zero_limit_rejected() {
        assert_eq!(RetryPolicy::new(0), Err(InvalidRetryLimit(0)));
    }

    #[test]
    fn test_decisions_for_limit_two() {
        let policy = RetryPolicy::new(2).unwrap();
        assert_eq!(policy.decide(0), RetryDecision::Retry { attempt: 1 });
        assert_eq!(policy.decide(1), RetryDecision::Retry { attempt: 2 });
        assert_eq!(policy.decide(2), RetryDecision::Exhausted { retries: 2 });
    }

    #[test]
    fn test_retries_never_exceed_limit() {
        for limit in 1..6 {
            let policy = RetryPolicy::new(limit).unwrap();
            let mut retries = 0;
            while let RetryDecision::Retry { attempt } = policy.decide(retries) {
                retries = attempt;
            }
            assert_eq!(retries, limit);
        }
    }
}
