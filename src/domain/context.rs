//! Operation Context
//!
//! Carries the caller's cancellation signal and deadline through use cases
//! down to every store call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Cancellation and deadline for one business operation.
///
/// Cloning is cheap; clones share the same cancellation token.
#[derive(Debug, Clone)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    started_at: Instant,
}

impl Default for OpContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OpContext {
    /// Context with no deadline and a fresh token
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            started_at: Instant::now(),
        }
    }

    /// Context cancelled together with `token`
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..Self::new()
        }
    }

    /// Derive a context whose deadline is at most `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
            started_at: self.started_at,
        }
    }

    /// The cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(operation.to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(self.deadline_exceeded(operation));
            }
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first; in that case `fut` is dropped.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(Error::Cancelled(operation.to_string())),
            _ = deadline => Err(self.deadline_exceeded(operation)),
            result = fut => result,
        }
    }

    fn deadline_exceeded(&self, operation: &str) -> Error {
        Error::DeadlineExceeded {
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
            context: operation.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = OpContext::new();
        let value = ctx.run("add", async { Ok::<_, Error>(1 + 1) }).await.unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_run_propagates_inner_error() {
        let ctx = OpContext::new();
        let result: Result<()> = ctx
            .run("fail", async { Err(Error::OrderNotFound(1)) })
            .await;
        assert_matches!(result, Err(Error::OrderNotFound(1)));
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let ctx = OpContext::new();
        ctx.cancel();

        let result: Result<()> = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_matches!(result, Err(Error::Cancelled(_)));
        assert_matches!(ctx.check("after"), Err(Error::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_run_deadline() {
        let ctx = OpContext::new().with_timeout(Duration::from_millis(20));

        let result: Result<()> = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_matches!(result, Err(Error::DeadlineExceeded { .. }));
        assert_matches!(ctx.check("after"), Err(Error::DeadlineExceeded { .. }));
    }

    #[test]
    fn test_timeout_never_extends_deadline() {
        tokio_test::block_on(async {
            let short = OpContext::new().with_timeout(Duration::from_millis(10));
            let derived = short.with_timeout(Duration::from_secs(60));
            assert_eq!(derived.deadline(), short.deadline());
        });
    }

    #[test]
    fn test_clones_share_cancellation() {
        let ctx = OpContext::new();
        let child = ctx.clone();
        ctx.cancel();
        assert!(child.is_cancelled());
    }
}
