//! Caller-scoped cancellation and deadlines.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use omnistore_common::{Error, Result};

/// Execution context passed through every adapter operation.
///
/// Cloning shares the same cancellation token, so cancelling any clone
/// cancels all of them. Use [`Context::child`] for a context that can be
/// cancelled independently of its parent.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Create a context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Create a context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context that is cancelled with this one and keeps its deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context whose deadline is at most `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail with a cancellation error if the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` until it completes, the context is cancelled or the
    /// deadline passes, whichever happens first.
    ///
    /// On cancellation the future is dropped, which aborts any in-flight
    /// request it owns.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(Error::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(Error::DeadlineExceeded),
                res = fut => res,
            },
            None => tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(Error::Cancelled),
                res = fut => res,
            },
        }
    }
}
