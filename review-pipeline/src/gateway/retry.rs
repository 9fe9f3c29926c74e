//! Bounded retry policies for gateway calls.
//!
//! A policy is plain data (max attempts + backoff function) executed at the
//! calling task's own suspension point via `tokio::time::sleep`; no ad hoc
//! threads, no unbounded loops. Two call classes exist:
//!
//! - eventual-consistency reads (MR diffs/changes appearing asynchronously
//!   after the hook fires): fixed delay while the result is empty;
//! - metadata fetches: exponential `2^attempt` backoff on server errors,
//!   rate limiting, and transport failures.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Backoff schedule between attempts.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// Same delay after every attempt.
    Fixed(Duration),
    /// `base^attempt` seconds (attempt counted from 0).
    Exponential { base_secs: u64 },
}

/// Bounded retry policy: how often and with which backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy for reads affected by upstream eventual consistency:
    /// 3 attempts, 10 s apart.
    pub const fn eventual_consistency() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(10)),
        }
    }

    /// Policy for metadata fetches: 3 attempts, exponential backoff.
    pub const fn metadata() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential { base_secs: 2 },
        }
    }

    /// Delay to sleep after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base_secs } => {
                Duration::from_secs(base_secs.saturating_pow(attempt))
            }
        }
    }
}

/// Outcome of a single attempt inside [`run_until_ready`].
#[derive(Debug)]
pub enum Attempt<T> {
    /// Usable result; stops the loop.
    Ready(T),
    /// Result not there yet; retry after the backoff delay.
    Pending,
    /// Unrecoverable outcome (non-2xx, client error); stops immediately.
    Halt,
}

/// Runs `op` under `policy` until it yields [`Attempt::Ready`], halts, or
/// the attempt ceiling is reached. Returns `None` on halt/exhaustion; the
/// caller degrades that to an empty/partial result.
pub async fn run_until_ready<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    for attempt in 0..policy.max_attempts {
        match op(attempt).await {
            Attempt::Ready(v) => return Some(v),
            Attempt::Halt => return None,
            Attempt::Pending => {
                if attempt + 1 < policy.max_attempts {
                    let delay = policy.delay_for(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max = policy.max_attempts,
                        delay_secs = delay.as_secs(),
                        "result pending, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn always_empty_call_is_attempted_exactly_max_retries_times() {
        let policy = RetryPolicy::eventual_consistency();
        let calls = AtomicU32::new(0);

        let out: Option<Vec<u8>> = run_until_ready(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Pending }
        })
        .await;

        assert!(out.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_empty_result_stops_the_loop() {
        let policy = RetryPolicy::eventual_consistency();
        let calls = AtomicU32::new(0);

        let out = run_until_ready(&policy, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 1 {
                    Attempt::Ready(vec![1u8])
                } else {
                    Attempt::Pending
                }
            }
        })
        .await;

        assert_eq!(out, Some(vec![1u8]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn halt_ends_immediately_without_further_attempts() {
        let policy = RetryPolicy::eventual_consistency();
        let calls = AtomicU32::new(0);

        let out: Option<()> = run_until_ready(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Halt }
        })
        .await;

        assert!(out.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_delays_double() {
        let policy = RetryPolicy::metadata();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }
}
