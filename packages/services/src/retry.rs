//! Retry Policy.
//!
//! A pure decision function: given the failure history kept in a [`ServiceRecord`] and the limits
//! of its [`ServiceSpec`], decide whether and when a crashed service is restarted.
//!
//! The delay grows exponentially with the number of retries already consumed
//! (`base * 2^retry_count`) and is capped. The caller increments `retry_count` when it acts on a
//! restart decision, and resets it to `0` on an explicitly requested start.
use std::time::Duration;

use hxe_primitives::{ServiceRecord, ServiceSpec};

/// The outcome of [`RetryPolicy::decide`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    RestartNow,
    RestartAfter(Duration),
    /// The retries are exhausted; the service is failed until an explicit command.
    GiveUp,
}

/// Exponential back-off bounded by the spec's `max_retries`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Decides what happens after a failure.
    #[must_use]
    pub fn decide(&self, record: &ServiceRecord, spec: &ServiceSpec) -> Decision {
        if is_exhausted(record, spec) {
            return Decision::GiveUp;
        }

        match self.delay(record.retry_count) {
            delay if delay.is_zero() => Decision::RestartNow,
            delay => Decision::RestartAfter(delay),
        }
    }

    /// The back-off before the retry that follows `retry_count` consumed retries.
    #[must_use]
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = 1_u32.checked_shl(retry_count).unwrap_or(u32::MAX);

        self.base.checked_mul(factor).map_or(self.cap, |delay| delay.min(self.cap))
    }
}

/// Returns `true` once the record consumed every retry its spec allows.
#[must_use]
pub fn is_exhausted(record: &ServiceRecord, spec: &ServiceSpec) -> bool {
    record.retry_count >= spec.max_retries
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hxe_primitives::{ServiceId, ServiceRecord, ServiceSpec};

    use super::{Decision, RetryPolicy};

    fn failing(retry_count: u32, max_retries: u32) -> (ServiceRecord, ServiceSpec) {
        let id = ServiceId::new("crasher").unwrap();

        let mut record = ServiceRecord::ready(id.clone());
        record.retry_count = retry_count;

        let mut spec = ServiceSpec::new(id, "crasher", "exit 1");
        spec.max_retries = max_retries;

        (record, spec)
    }

    #[test]
    fn it_should_back_off_exponentially_from_the_base_delay() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(60));

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(1600));
    }

    #[test]
    fn it_should_cap_the_delay() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(policy.delay(3), Duration::from_secs(5));
        assert_eq!(policy.delay(40), Duration::from_secs(5));
    }

    #[test]
    fn it_should_restart_while_retries_remain() {
        let policy = RetryPolicy::new(Duration::from_millis(10), Duration::from_secs(1));
        let (record, spec) = failing(1, 2);

        assert_eq!(policy.decide(&record, &spec), Decision::RestartAfter(Duration::from_millis(20)));
    }

    #[test]
    fn it_should_restart_immediately_without_a_base_delay() {
        let policy = RetryPolicy::new(Duration::ZERO, Duration::from_secs(1));
        let (record, spec) = failing(0, 1);

        assert_eq!(policy.decide(&record, &spec), Decision::RestartNow);
    }

    #[test]
    fn it_should_give_up_once_the_retries_are_exhausted() {
        let policy = RetryPolicy::default();

        let (record, spec) = failing(2, 2);
        assert_eq!(policy.decide(&record, &spec), Decision::GiveUp);

        let (record, spec) = failing(0, 0);
        assert_eq!(policy.decide(&record, &spec), Decision::GiveUp);
    }
}
