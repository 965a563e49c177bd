//! Composable retry & wait framework.
//!
//! Every cloud call in STRATUS goes through this module. An attempt loop is
//! assembled from four independent policies:
//!
//! - an **action**: an async callable returning `Result<()>`,
//! - an **arbiter**: decides after each try whether to retry, stop, or abandon,
//! - a **backoff**: generates the delay before the next try,
//! - an optional **notify** observer, invoked with every try and its verdict.
//!
//! Wall-clock timeouts are an arbiter ([`Arbiter::Timeout`]) and therefore
//! independent of the try count. On timeout the loop returns
//! [`StratusError::Timeout`] carrying the last underlying error, so callers
//! can pattern-match on the kind.

use crate::error::{ErrorKind, Result, StratusError};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::trace;

/// Outcome of arbitration for a single try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Try again after the backoff delay.
    Retry,
    /// The action reached its goal; stop with success.
    Done,
    /// Stop without success; surfaces a timeout or the hard error.
    Abandon,
}

/// One attempt as observed by arbiters and notify hooks.
#[derive(Debug)]
pub struct Try {
    /// 1-based attempt counter.
    pub attempt: u32,
    /// Wall-clock time elapsed since the loop started.
    pub elapsed: Duration,
    /// Error returned by the action, `None` on success.
    pub err: Option<StratusError>,
}

/// Delay generator between tries.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// Same delay every try.
    Constant(Duration),
    /// `base * 2^(attempt-1)`, capped at 16 doublings.
    Exponential(Duration),
    /// `fib(attempt) * unit`.
    Fibonacci(Duration),
}

impl Backoff {
    /// Delay to apply after the given (1-based) attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Constant(d) => *d,
            Backoff::Exponential(base) => {
                let shift = (attempt.saturating_sub(1)).min(16);
                base.saturating_mul(1u32 << shift)
            }
            Backoff::Fibonacci(unit) => unit.saturating_mul(fibonacci(attempt)),
        }
    }
}

fn fibonacci(n: u32) -> u32 {
    let (mut a, mut b) = (0u32, 1u32);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

/// Stop condition, composable by value.
#[derive(Debug, Clone)]
pub enum Arbiter {
    /// Done on success, retry on any error.
    UnsuccessfulDone,
    /// Done on success, retry while the error is transient (the SSH runner
    /// maps client exit status 255 to a transient error), abandon on any
    /// hard error.
    UnsuccessfulWhereRetcode255,
    /// Abandon once the wall-clock limit is exceeded, retry before that.
    Timeout(Duration),
    /// Composite: the first non-retry verdict, in order, prevails.
    PrevailDone(Vec<Arbiter>),
}

impl Arbiter {
    /// Judge a try.
    pub fn verdict(&self, t: &Try) -> Verdict {
        match self {
            Arbiter::UnsuccessfulDone => match t.err {
                None => Verdict::Done,
                Some(_) => Verdict::Retry,
            },
            Arbiter::UnsuccessfulWhereRetcode255 => match &t.err {
                None => Verdict::Done,
                Some(e) if e.kind() == ErrorKind::Transient => Verdict::Retry,
                Some(_) => Verdict::Abandon,
            },
            Arbiter::Timeout(limit) => {
                if t.elapsed >= *limit {
                    Verdict::Abandon
                } else {
                    Verdict::Retry
                }
            }
            Arbiter::PrevailDone(arbiters) => {
                for arbiter in arbiters {
                    match arbiter.verdict(t) {
                        Verdict::Retry => continue,
                        prevailing => return prevailing,
                    }
                }
                Verdict::Retry
            }
        }
    }

    /// Wall-clock limit carried by this arbiter, if any.
    fn timeout_limit(&self) -> Option<Duration> {
        match self {
            Arbiter::Timeout(limit) => Some(*limit),
            Arbiter::PrevailDone(arbiters) => arbiters.iter().find_map(|a| a.timeout_limit()),
            _ => None,
        }
    }
}

/// Observer invoked with every try and its verdict.
pub type NotifyFn = dyn Fn(&Try, Verdict) + Send + Sync;

/// Run `action` under the given policies.
///
/// A [`StratusError::Cancelled`] returned by the action aborts immediately
/// and is never retried.
pub async fn action<F, Fut>(
    mut action: F,
    arbiter: Arbiter,
    backoff: Backoff,
    notify: Option<&NotifyFn>,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match action().await {
            Ok(()) => None,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => Some(e),
        };
        let t = Try { attempt, elapsed: started.elapsed(), err };
        let verdict = arbiter.verdict(&t);
        trace!(attempt, elapsed = ?t.elapsed, ?verdict, "retry arbitration");
        if let Some(notify) = notify {
            notify(&t, verdict);
        }
        match verdict {
            Verdict::Done => return Ok(()),
            Verdict::Abandon => {
                return match arbiter.timeout_limit() {
                    Some(limit) if t.elapsed >= limit => {
                        Err(StratusError::timeout("retried action", limit, t.err))
                    }
                    _ => Err(t
                        .err
                        .unwrap_or_else(|| StratusError::logic("action abandoned without error"))),
                };
            }
            Verdict::Retry => tokio::time::sleep(backoff.delay(attempt)).await,
        }
    }
}

/// Retry `action` with an arbitrary constant delay until success or `timeout`.
pub async fn while_unsuccessful<F, Fut>(action_fn: F, delay: Duration, timeout: Duration) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    action(
        action_fn,
        Arbiter::PrevailDone(vec![Arbiter::UnsuccessfulDone, Arbiter::Timeout(timeout)]),
        Backoff::Constant(delay),
        None,
    )
    .await
}

/// Retry every 5 seconds until success or `timeout`.
pub async fn while_unsuccessful_delay_5s<F, Fut>(action_fn: F, timeout: Duration) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    while_unsuccessful(action_fn, Duration::from_secs(5), timeout).await
}

/// Retry every second until success or `timeout`, reporting each try to `notify`.
pub async fn while_unsuccessful_delay_1s_with_notify<F, Fut>(
    action_fn: F,
    timeout: Duration,
    notify: &NotifyFn,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    action(
        action_fn,
        Arbiter::PrevailDone(vec![Arbiter::UnsuccessfulDone, Arbiter::Timeout(timeout)]),
        Backoff::Constant(Duration::from_secs(1)),
        Some(notify),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn successful_action_runs_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let result = while_unsuccessful(
            move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            Duration::from_millis(5),
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_action_times_out_within_bounds() {
        let started = Instant::now();
        let timeout = Duration::from_millis(120);
        let backoff = Duration::from_millis(20);
        let result = while_unsuccessful(
            || async { Err(StratusError::transient("still broken")) },
            backoff,
            timeout,
        )
        .await;
        let elapsed = started.elapsed();
        let err = result.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
        assert!(elapsed >= timeout);
        // one extra backoff plus scheduling slack is the worst case
        assert!(elapsed < timeout + backoff + Duration::from_millis(200));
    }

    #[tokio::test]
    async fn timeout_error_carries_last_cause() {
        let err = while_unsuccessful(
            || async { Err(StratusError::transient("volume not in state 'available'")) },
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();
        match err {
            StratusError::Timeout { cause: Some(cause), .. } => {
                assert!(cause.to_string().contains("available"));
            }
            other => panic!("expected timeout with cause, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_is_never_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let err = while_unsuccessful(
            move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(StratusError::Cancelled)
                }
            },
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retcode_255_arbiter_abandons_on_hard_error() {
        let result = action(
            || async { Err(StratusError::logic("remote script failed")) },
            Arbiter::PrevailDone(vec![
                Arbiter::UnsuccessfulWhereRetcode255,
                Arbiter::Timeout(Duration::from_secs(5)),
            ]),
            Backoff::Constant(Duration::from_millis(1)),
            None,
        )
        .await;
        let err = result.unwrap_err();
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("remote script failed"));
    }

    #[tokio::test]
    async fn notify_sees_every_try() {
        let seen = Arc::new(AtomicU32::new(0));
        let observer = seen.clone();
        let notify = move |t: &Try, _v: Verdict| {
            observer.store(t.attempt, Ordering::SeqCst);
        };
        let _ = while_unsuccessful_delay_1s_with_notify(
            || async { Ok(()) },
            Duration::from_secs(1),
            &notify,
        )
        .await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_sequences() {
        let constant = Backoff::Constant(Duration::from_secs(3));
        assert_eq!(constant.delay(1), Duration::from_secs(3));
        assert_eq!(constant.delay(7), Duration::from_secs(3));

        let exponential = Backoff::Exponential(Duration::from_secs(1));
        assert_eq!(exponential.delay(1), Duration::from_secs(1));
        assert_eq!(exponential.delay(4), Duration::from_secs(8));

        let fib = Backoff::Fibonacci(Duration::from_secs(1));
        let seq: Vec<u64> = (1..=6).map(|n| fib.delay(n).as_secs()).collect();
        assert_eq!(seq, vec![1, 1, 2, 3, 5, 8]);
    }
}
