//! Bounded polling for eventually-consistent UI state
//!
//! The IDE updates asynchronously (language-server indexing, round trips to
//! the org, CLI subprocesses finishing), so any assertion about a UI side
//! effect is phrased as "sample until found or out of time". Absence is
//! reported as [`PollOutcome::TimedOut`], never as an error, so the caller
//! decides whether it is fatal.
//!
//! There is no retry of failed operations here: a probe that errors aborts
//! the poll.

use crate::errors::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Default sampling quantum for UI polling
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result of a bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe produced a value
    Found(T),
    /// The budget ran out first
    TimedOut {
        /// Time spent polling
        elapsed: Duration,
        /// Number of samples taken
        attempts: u32,
    },
}

impl<T> PollOutcome<T> {
    /// Whether the probe succeeded
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The found value, if any
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::TimedOut { .. } => None,
        }
    }
}

/// Sample `probe` every `interval` until it yields `Some` or `timeout` elapses
///
/// The probe always runs at least once. The final sleep is clipped to the
/// remaining budget, so the poll returns within `timeout` plus one probe.
#[instrument(level = "debug", skip(probe))]
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    // A timeout past the clock's range never expires
    let deadline = start.checked_add(timeout);
    let mut attempts = 0u32;

    loop {
        attempts = attempts.saturating_add(1);
        if let Some(value) = probe().await? {
            debug!(attempts, elapsed = ?start.elapsed(), "poll matched");
            return Ok(PollOutcome::Found(value));
        }

        let now = Instant::now();
        let pause = match deadline {
            Some(deadline) if now >= deadline => {
                let elapsed = now - start;
                debug!(attempts, ?elapsed, "poll timed out");
                return Ok(PollOutcome::TimedOut { elapsed, attempts });
            }
            Some(deadline) => interval.min(deadline - now),
            None => interval,
        };
        tokio::time::sleep(pause).await;
    }
}

/// Sample `probe` up to `attempts` times, sleeping `interval` between samples
///
/// Used where the budget is a number of looks rather than a deadline.
#[instrument(level = "debug", skip(probe))]
pub async fn poll_attempts<T, F, Fut>(
    attempts: u32,
    interval: Duration,
    mut probe: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        if let Some(value) = probe().await? {
            debug!(attempt, "poll matched");
            return Ok(PollOutcome::Found(value));
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    let elapsed = start.elapsed();
    debug!(attempts, ?elapsed, "poll exhausted attempts");
    Ok(PollOutcome::TimedOut { elapsed, attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_found_on_third_sample() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome = poll_until(Duration::from_secs(1), Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((n == 3).then_some(n))
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Found(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_times_out_within_one_quantum() {
        let start = Instant::now();
        let outcome: PollOutcome<()> =
            poll_until(Duration::from_secs(1), Duration::from_secs(5), || async {
                Ok(None)
            })
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(!outcome.is_found());
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed <= Duration::from_secs(6));
        match outcome {
            PollOutcome::TimedOut { attempts, .. } => assert_eq!(attempts, 6),
            PollOutcome::Found(_) => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_zero_timeout_samples_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome: PollOutcome<()> = poll_until(Duration::from_secs(1), Duration::ZERO, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })
        .await
        .unwrap();
        assert!(!outcome.is_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_unbounded_timeout() {
        let outcome = poll_until(Duration::from_secs(1), Duration::MAX, || async { Ok(Some(7)) })
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Found(7));

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome = poll_until(Duration::from_secs(1), Duration::MAX, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok((n == 4).then_some(n)) }
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Found(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_propagates_probe_error() {
        let result: Result<PollOutcome<()>> =
            poll_until(Duration::from_secs(1), Duration::from_secs(5), || async {
                Err(crate::errors::ProvostError::Ide("driver gone".to_string()))
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_attempts_exhausts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let start = Instant::now();
        let outcome: PollOutcome<()> = poll_attempts(4, Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // No sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert!(outcome.found().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_attempts_found_first_try() {
        let outcome = poll_attempts(10, Duration::from_secs(1), || async { Ok(Some("ok")) })
            .await
            .unwrap();
        assert_eq!(outcome.found(), Some("ok"));
    }
}
