//! Retry Sweeper policy (spec §4.3).
//!
//! `SweeperPolicy` is pure configuration; the sweep itself (the SQL that
//! reclaims timed-out or errored jobs and re-queues them, or dead-letters
//! them once `max_attempts` is exhausted) is composed as a single statement
//! in `broker-postgres` so it shares a transaction with claiming. Keeping
//! the policy here — rather than as bare constants scattered through the
//! SQL layer — gives the threshold math one place to be unit tested.

use chrono::Duration;

/// Timing and retry-budget knobs that govern both the sweeper and the lease
/// clock. Constructed once from config at startup (spec §6 Config).
#[derive(Debug, Clone, Copy)]
pub struct SweeperPolicy {
    /// How long a PROCESSING job may go without a heartbeat before it's
    /// considered timed out.
    pub job_timeout: Duration,
    /// Extra slack added to `job_timeout` before the sweeper acts, so a
    /// heartbeat landing right at the boundary isn't raced.
    pub grace_period: Duration,
    /// Total attempts (including the first) before a job is dead-lettered
    /// into FAILED instead of being re-queued.
    pub max_attempts: i32,
}

impl SweeperPolicy {
    pub fn new(job_timeout: Duration, grace_period: Duration, max_attempts: i32) -> Self {
        Self {
            job_timeout,
            grace_period,
            max_attempts,
        }
    }

    /// Total window a PROCESSING job is given before the sweeper treats it
    /// as abandoned (spec §4.3: `job_timeout + grace_period`).
    pub fn timeout_with_grace(&self) -> Duration {
        self.job_timeout + self.grace_period
    }

    /// ERROR jobs are always immediately eligible for retry, with no timeout
    /// component — this is a resolved Open Question (spec §9), grounded on
    /// the original `assign_job_to_worker` sweep predicate, which ORs the
    /// timed-out-PROCESSING branch with a timeout-free ERROR branch.
    pub fn error_state_requires_timeout() -> bool {
        false
    }

    /// True once `previous_attempts` has reached the budget and a further
    /// failure should dead-letter the job into FAILED rather than retry it.
    pub fn attempts_exhausted(&self, previous_attempts: i32) -> bool {
        previous_attempts >= self.max_attempts - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SweeperPolicy {
        SweeperPolicy::new(Duration::seconds(300), Duration::seconds(10), 5)
    }

    #[test]
    fn timeout_with_grace_adds_both_components() {
        let p = policy();
        assert_eq!(p.timeout_with_grace(), Duration::seconds(310));
    }

    #[test]
    fn attempts_exhausted_at_budget_boundary() {
        let p = policy();
        assert!(!p.attempts_exhausted(3));
        assert!(p.attempts_exhausted(4));
        assert!(p.attempts_exhausted(5));
    }

    #[test]
    fn error_state_never_requires_a_timeout() {
        assert!(!SweeperPolicy::error_state_requires_timeout());
    }
}
