//! Fixed-interval polling with an injectable clock.
//!
//! A `Poller` drives one attempt closure until it reports `Poll::Ready`.
//! Attempt errors are returned immediately; nothing is retried. The loop
//! also stops when the optional timeout would be crossed by the next
//! sleep, or when its `CancelToken` is set.
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Interval between polls of remote state.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Shared flag that stops every poller holding a clone of it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Upper bound on total wait time; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

/// Result of a single poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    Pending,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out after {}s waiting for {label}", elapsed.as_secs())]
    TimedOut { label: String, elapsed: Duration },
    #[error("cancelled while waiting for {label}")]
    Cancelled { label: String },
}

pub struct Poller<'a> {
    clock: &'a dyn Clock,
    policy: PollPolicy,
    cancel: CancelToken,
}

impl<'a> Poller<'a> {
    pub fn new(clock: &'a dyn Clock, policy: PollPolicy) -> Self {
        Self {
            clock,
            policy,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `attempt` until it is ready. The closure receives the 1-based
    /// attempt number.
    pub fn run<T, F>(&self, label: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<Poll<T>>,
    {
        let started = self.clock.now();
        let mut attempts = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(WaitError::Cancelled {
                    label: label.to_string(),
                }
                .into());
            }
            attempts += 1;
            if let Poll::Ready(value) = attempt(attempts)? {
                tracing::debug!(label, attempts, "poll ready");
                return Ok(value);
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if let Some(timeout) = self.policy.timeout {
                if elapsed + self.policy.interval > timeout {
                    return Err(WaitError::TimedOut {
                        label: label.to_string(),
                        elapsed,
                    }
                    .into());
                }
            }
            tracing::debug!(
                label,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "poll pending"
            );
            self.clock.sleep(self.policy.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use anyhow::anyhow;

    fn policy(timeout: Option<u64>) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(5),
            timeout: timeout.map(Duration::from_secs),
        }
    }

    #[test]
    fn sleeps_between_pending_attempts_until_ready() {
        let clock = ManualClock::new();
        let poller = Poller::new(&clock, policy(None));
        let value = poller
            .run("thing", |attempt| {
                Ok(if attempt == 4 {
                    Poll::Ready(attempt)
                } else {
                    Poll::Pending
                })
            })
            .expect("ready");
        assert_eq!(value, 4);
        assert_eq!(clock.sleeps(), 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(15));
    }

    #[test]
    fn first_ready_attempt_never_sleeps() {
        let clock = ManualClock::new();
        let poller = Poller::new(&clock, policy(Some(1)));
        let value = poller.run("thing", |_| Ok(Poll::Ready("done"))).expect("ready");
        assert_eq!(value, "done");
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn attempt_errors_are_not_retried() {
        let clock = ManualClock::new();
        let poller = Poller::new(&clock, policy(None));
        let mut calls = 0;
        let err = poller
            .run::<(), _>("thing", |_| {
                calls += 1;
                Err(anyhow!("service unavailable"))
            })
            .expect_err("error propagates");
        assert_eq!(calls, 1);
        assert_eq!(err.to_string(), "service unavailable");
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn timeout_stops_before_crossing_the_deadline() {
        let clock = ManualClock::new();
        let poller = Poller::new(&clock, policy(Some(12)));
        let mut calls = 0;
        let err = poller
            .run::<(), _>("image ami-1", |_| {
                calls += 1;
                Ok(Poll::Pending)
            })
            .expect_err("times out");
        // Attempts at t=0, 5 and 10; a fourth sleep would end at 15 > 12.
        assert_eq!(calls, 3);
        assert_eq!(
            err.downcast_ref::<WaitError>(),
            Some(&WaitError::TimedOut {
                label: "image ami-1".to_string(),
                elapsed: Duration::from_secs(10),
            })
        );
    }

    #[test]
    fn cancelled_token_stops_before_next_attempt() {
        let clock = ManualClock::new();
        let cancel = CancelToken::new();
        let poller = Poller::new(&clock, policy(None)).with_cancel(cancel.clone());
        let err = poller
            .run::<(), _>("thing", |attempt| {
                if attempt == 2 {
                    cancel.cancel();
                }
                Ok(Poll::Pending)
            })
            .expect_err("cancelled");
        assert!(matches!(
            err.downcast_ref::<WaitError>(),
            Some(WaitError::Cancelled { .. })
        ));
        assert_eq!(clock.sleeps(), 2);
    }
}
