//! Poll-wait engine
//!
//! Repeatedly evaluates a predicate until it is satisfied, the attempt
//! budget is used up, or the overall deadline elapses.
//!
//! A predicate returns:
//! - `Ok(Some(value))` - satisfied, polling stops with `Satisfied(value)`
//! - `Ok(None)` - not yet, polling continues
//! - `Err(cause)` - hard failure, polling stops with `PredicateError(cause)`
//!
//! Errors are never retried here. Predicates that want to ride out transient
//! failures must catch them and report `Ok(None)`.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Attempt/interval/timeout budget for one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    attempts: u32,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl PollPolicy {
    /// Create a policy without an overall timeout
    pub fn new(attempts: u32, poll_interval: Duration) -> Result<Self> {
        if attempts == 0 {
            return Err(Error::InvalidPolicy(
                "attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            attempts,
            poll_interval,
            timeout: None,
        })
    }

    /// Create a policy from millisecond values
    pub fn from_millis(attempts: u32, poll_interval_ms: u64, timeout_ms: Option<u64>) -> Result<Self> {
        let policy = Self::new(attempts, Duration::from_millis(poll_interval_ms))?;
        Ok(match timeout_ms {
            Some(ms) => policy.with_timeout(Duration::from_millis(ms)),
            None => policy,
        })
    }

    /// A single evaluation with no retry
    pub fn once() -> Self {
        Self {
            attempts: 1,
            poll_interval: Duration::ZERO,
            timeout: None,
        }
    }

    /// Add an overall ceiling. The timeout wins over the attempt budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let budget = self.poll_interval.saturating_mul(self.attempts.saturating_sub(1));
        if budget > timeout {
            debug!(
                "Poll budget {:?} exceeds timeout {:?}; timeout truncates remaining attempts",
                budget, timeout
            );
        }
        self.timeout = Some(timeout);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Absolute deadline for a wait that begins at `start`
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        self.timeout.map(|t| start + t)
    }
}

/// Result of a poll-wait
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    /// The predicate was satisfied
    Satisfied(T),
    /// Every attempt ran and none satisfied the predicate
    Exhausted { attempts: u32, elapsed: Duration },
    /// The deadline elapsed first
    TimedOut { attempts: u32, elapsed: Duration },
    /// The predicate failed; polling stopped immediately
    PredicateError(E),
}

impl<T, E> PollOutcome<T, E> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied(_))
    }

    /// Number of evaluations, when the outcome records it
    pub fn attempts(&self) -> Option<u32> {
        match self {
            PollOutcome::Exhausted { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    /// Convert into a `Result`, mapping the non-success tags to errors
    pub fn into_result<X, Y>(self, on_exhausted: X, on_timeout: Y) -> std::result::Result<T, E>
    where
        X: FnOnce(u32, Duration) -> E,
        Y: FnOnce(u32, Duration) -> E,
    {
        match self {
            PollOutcome::Satisfied(value) => Ok(value),
            PollOutcome::Exhausted { attempts, elapsed } => Err(on_exhausted(attempts, elapsed)),
            PollOutcome::TimedOut { attempts, elapsed } => Err(on_timeout(attempts, elapsed)),
            PollOutcome::PredicateError(e) => Err(e),
        }
    }
}

/// Poll `predicate` under `policy`, with the deadline measured from now
pub async fn poll_until<T, E, F, Fut>(policy: &PollPolicy, predicate: F) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Option<T>, E>>,
{
    poll_until_deadline(policy, policy.deadline_from(Instant::now()), predicate).await
}

/// Poll `predicate` under `policy` against a deadline computed by the caller.
///
/// The policy's own timeout is ignored; `deadline` is authoritative. The
/// first evaluation always runs. Evaluations still in flight at the deadline
/// are dropped.
pub async fn poll_until_deadline<T, E, F, Fut>(
    policy: &PollPolicy,
    deadline: Option<Instant>,
    mut predicate: F,
) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Option<T>, E>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        trace!("Poll attempt {}/{}", attempts, policy.attempts);

        let evaluation = predicate();
        let result = match deadline {
            Some(deadline) => match timeout_at(deadline, evaluation).await {
                Ok(result) => result,
                Err(_) => {
                    debug!("Deadline elapsed during poll attempt {}", attempts);
                    return PollOutcome::TimedOut {
                        attempts,
                        elapsed: start.elapsed(),
                    };
                }
            },
            None => evaluation.await,
        };

        match result {
            Ok(Some(value)) => return PollOutcome::Satisfied(value),
            Ok(None) => {}
            Err(e) => return PollOutcome::PredicateError(e),
        }

        if attempts >= policy.attempts {
            return PollOutcome::Exhausted {
                attempts,
                elapsed: start.elapsed(),
            };
        }

        let wake = Instant::now() + policy.poll_interval;
        if let Some(deadline) = deadline {
            if wake >= deadline {
                sleep_until(deadline).await;
                return PollOutcome::TimedOut {
                    attempts,
                    elapsed: start.elapsed(),
                };
            }
        }

        if policy.poll_interval.is_zero() {
            // Busy-poll still yields so other tasks are not starved
            tokio::task::yield_now().await;
        } else {
            sleep_until(wake).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn policy(attempts: u32, interval_ms: u64) -> PollPolicy {
        PollPolicy::from_millis(attempts, interval_ms, None).unwrap()
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(
            PollPolicy::new(0, Duration::from_secs(1)),
            Err(Error::InvalidPolicy(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_evaluates_once() {
        let mut calls = 0;
        let outcome = poll_until(&policy(1, 1000), || {
            calls += 1;
            async { Ok::<Option<()>, ()>(None) }
        })
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(outcome, PollOutcome::Exhausted { attempts: 1, .. }));
        assert_eq!(outcome.attempts(), Some(1));

        let mut calls = 0;
        let outcome = poll_until(&PollPolicy::once(), || {
            calls += 1;
            async { Err::<Option<()>, &str>("boom") }
        })
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(outcome, PollOutcome::PredicateError("boom")));
        assert_eq!(outcome.attempts(), None);

        let mut calls = 0;
        let outcome = poll_until(&PollPolicy::once(), || {
            calls += 1;
            async { Ok::<_, ()>(Some(7)) }
        })
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(outcome, PollOutcome::Satisfied(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_exact_attempts() {
        let mut calls = 0;
        let start = Instant::now();
        let outcome = poll_until(&policy(5, 1000), || {
            calls += 1;
            async { Ok::<Option<()>, ()>(None) }
        })
        .await;

        assert_eq!(calls, 5);
        assert!(matches!(outcome, PollOutcome::Exhausted { attempts: 5, .. }));
        // No sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_on_third_poll() {
        let mut observations = vec![false, false, true].into_iter();
        let start = Instant::now();
        let outcome = poll_until(&policy(5, 1000), || {
            let ready = observations.next().unwrap_or(false);
            async move { Ok::<_, ()>(ready.then_some("running")) }
        })
        .await;

        assert!(matches!(outcome, PollOutcome::Satisfied("running")));
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
        assert_eq!(observations.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_truncates_attempts() {
        let mut calls = 0;
        let start = Instant::now();
        let tight = policy(10, 1000).with_timeout(Duration::from_millis(2500));
        let outcome = poll_until(&tight, || {
            calls += 1;
            async { Ok::<Option<()>, ()>(None) }
        })
        .await;

        // Evaluations at 0ms, 1000ms, 2000ms; the next would start past the deadline
        assert_eq!(calls, 3);
        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 3, .. }));
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_tighter_than_timeout() {
        let mut calls = 0;
        let loose = policy(3, 100).with_timeout(Duration::from_secs(60));
        let outcome = poll_until(&loose, || {
            calls += 1;
            async { Ok::<Option<()>, ()>(None) }
        })
        .await;

        assert_eq!(calls, 3);
        assert!(matches!(outcome, PollOutcome::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_predicate_is_cut_at_deadline() {
        let start = Instant::now();
        let bounded = policy(3, 100).with_timeout(Duration::from_secs(2));
        let outcome = poll_until(&bounded, || async {
            std::future::pending::<std::result::Result<Option<()>, ()>>().await
        })
        .await;

        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 1, .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_error_is_not_retried() {
        let mut calls = 0;
        let outcome = poll_until(&policy(5, 10), || {
            calls += 1;
            let fail = calls == 2;
            async move {
                if fail {
                    Err("transport down")
                } else {
                    Ok::<Option<()>, _>(None)
                }
            }
        })
        .await;

        assert_eq!(calls, 2);
        assert!(matches!(outcome, PollOutcome::PredicateError("transport down")));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_zero_interval_yields_to_other_tasks() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move { setter.store(true, Ordering::SeqCst) });

        // Only another task on this thread can satisfy the predicate
        let mut calls = 0;
        let outcome = poll_until(&policy(1000, 0), || {
            calls += 1;
            let done = flag.load(Ordering::SeqCst);
            async move { Ok::<_, ()>(done.then_some(())) }
        })
        .await;

        assert!(outcome.is_satisfied());
        assert!(calls > 1);
    }

    #[test]
    fn test_once_policy() {
        let once = PollPolicy::once();
        assert_eq!(once.attempts(), 1);
        assert!(once.poll_interval().is_zero());
        assert_eq!(once.timeout(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_into_result_maps_tags() {
        let outcome: PollOutcome<(), String> = PollOutcome::Exhausted {
            attempts: 4,
            elapsed: Duration::from_secs(3),
        };
        let err = outcome
            .into_result(|n, _| format!("exhausted after {n}"), |_, _| "timeout".to_string())
            .unwrap_err();
        assert_eq!(err, "exhausted after 4");
    }
}
