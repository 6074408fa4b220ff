//! Caller-supplied cancellation signal with an optional deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorKind, Result};

/// Cancellation and deadline carried through every blocking operation.
///
/// Network I/O, backoff sleeps and job polling all race against the context,
/// so cancellation interrupts a wait promptly instead of after the full
/// remaining delay. Expiry surfaces as [`ErrorKind::Cancelled`] or
/// [`ErrorKind::DeadlineExceeded`], never as an API error.
///
/// Cloning shares the cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// Wrap an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set or tighten the deadline.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Set or tighten the deadline relative to now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline_at(Instant::now() + timeout)
    }

    /// A child context: cancelled with its parent, cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Fire the cancellation signal.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the cancellation error if the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::new(ErrorKind::Cancelled));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::new(ErrorKind::DeadlineExceeded));
            }
        }
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Resolves with the cancellation error once the context is done.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => Error::new(ErrorKind::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Error::new(ErrorKind::DeadlineExceeded),
            },
            None => {
                self.token.cancelled().await;
                Error::new(ErrorKind::Cancelled)
            }
        }
    }

    /// Run `future` unless the context finishes first.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output> {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = future => Ok(output),
        }
    }

    /// Sleep for `duration`, returning early with an error on cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(tokio::time::sleep(duration)).await
    }
}
