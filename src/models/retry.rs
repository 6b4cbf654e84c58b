use std::time::Duration;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    // Carries the incremented counter to write into the requeued message.
    Requeue { retry_count: u32, delay: Duration },
    DeadLetter,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    // `retry_count` is the counter read from delivery metadata before this
    // failure. A transiently failing job is requeued while that counter is
    // below the ceiling, so it is attempted max_retries + 1 times in total
    // before dead-lettering. Permanent failures never enter the retry budget.
    pub fn decide(&self, failure: &DispatchError, retry_count: u32) -> RetryDecision {
        if failure.is_permanent() {
            return RetryDecision::DeadLetter;
        }

        if retry_count < self.max_retries {
            let attempt = retry_count + 1;
            RetryDecision::Requeue {
                retry_count: attempt,
                delay: Duration::from_secs(u64::from(attempt) * u64::from(attempt)),
            }
        } else {
            RetryDecision::DeadLetter
        }
    }
}
