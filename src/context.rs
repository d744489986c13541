//! Call context for store operations.
//!
//! Every store call made by the apply engine or the sync orchestrator runs
//! under an [`ApplyContext`]: a cancellation token plus an optional
//! deadline. On cancellation the call returns immediately with
//! [`StoreError::Cancelled`]; retrying is left to the caller's scheduler.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

/// Cancelable, deadline-bound context for one reconcile pass.
#[derive(Debug, Clone, Default)]
pub struct ApplyContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ApplyContext {
    /// Creates a context with no deadline and a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context bound to an existing cancellation token.
    #[must_use]
    pub const fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Sets a deadline relative to now. An earlier existing deadline wins.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns a child context that is cancelled with this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels the context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Checks the context without waiting.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` or `DeadlineExceeded` if the context is done.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Runs a store call under this context.
    ///
    /// # Errors
    ///
    /// Returns the call's own error, or `Cancelled`/`DeadlineExceeded` if
    /// the context finished first.
    pub async fn run<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.check()?;

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, call)
                    .await
                    .unwrap_or(Err(StoreError::DeadlineExceeded)),
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(StoreError::Cancelled),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_through_result() {
        let ctx = ApplyContext::new();
        let value = ctx.run(async { Ok::<_, StoreError>(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err = ctx
            .run(async { Err::<(), _>(StoreError::not_found("pods", "a")) })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let ctx = ApplyContext::new();
        ctx.cancel();

        let err = ctx
            .run(async { Ok::<_, StoreError>(()) })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Cancelled);
        assert!(ctx.child().check().is_err());
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = ApplyContext::new().with_timeout(Duration::from_millis(50));

        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::DeadlineExceeded);
    }

    #[test]
    fn test_child_keeps_earlier_deadline() {
        let parent = ApplyContext::new().with_timeout(Duration::from_secs(1));
        let child = parent.child().with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.child().with_timeout(Duration::from_millis(1));
        assert!(tighter.deadline() < parent.deadline());
    }
}
