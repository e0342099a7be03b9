use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Why a [`ProbeContext`] stopped waiting.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutOrCancel {
    Timeout,
    Cancel,
}

impl fmt::Display for TimeoutOrCancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutOrCancel::Timeout => write!(f, "timeout"),
            TimeoutOrCancel::Cancel => write!(f, "cancel"),
        }
    }
}

/// Deadline and cancellation signal handed to every probe call.
///
/// The probe never imposes a timeout of its own; callers bound the attempt by
/// attaching a deadline, cancelling the token, or both.
#[derive(Clone, Debug, Default)]
pub struct ProbeContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ProbeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Keeps the earlier of the current deadline and `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A context cancelled together with `self` that can also be cancelled on
    /// its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves on the first of deadline or cancellation.
    pub async fn done(&self) -> TimeoutOrCancel {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => TimeoutOrCancel::Cancel,
                _ = sleep_until(deadline) => TimeoutOrCancel::Timeout,
            },
            None => {
                self.cancel.cancelled().await;
                TimeoutOrCancel::Cancel
            }
        }
    }

    /// Races `fut` against [`ProbeContext::done`]. The context is polled first,
    /// so an expired context never starts `fut`; when the context wins, `fut`
    /// is dropped without being polled again.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, TimeoutOrCancel>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            out = fut => Ok(out),
        }
    }
}
