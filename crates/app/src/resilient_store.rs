//! Bounded retry and timeout around any [`KeyValueStore`].
//!
//! Every call gets a deadline. Retryable failures (timeouts and
//! `StoreUnavailable`) are retried with exponential backoff up to
//! `max_attempts`, then surfaced as `StoreUnavailable`. The conditional
//! writes `set_if_absent` and `delete_if_value` are not idempotent and are
//! never retried.

use std::future::Future;
use std::time::Duration;

use tankhub_domain::error::TankHubError;

use crate::ports::KeyValueStore;

/// Timeout and retry settings for [`ResilientStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled after each failure.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

/// Decorator adding [`RetryPolicy`] to an inner store.
#[derive(Debug, Clone)]
pub struct ResilientStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: KeyValueStore> ResilientStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn attempt<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, TankHubError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, TankHubError>> + Send,
        T: Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 1;
        loop {
            let err = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if !err.is_retryable() => return Err(err),
                Ok(Err(err)) => err,
                Err(elapsed) => TankHubError::storage(elapsed),
            };
            if attempt >= max_attempts {
                tracing::error!(operation, attempt, error = %err, "store call failed, giving up");
                return Err(err);
            }
            tracing::warn!(operation, attempt, error = %err, "store call failed, retrying");
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
            attempt += 1;
        }
    }
}

impl<S: KeyValueStore> KeyValueStore for ResilientStore<S> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, TankHubError>> + Send {
        self.attempt("get", move || self.inner.get(key))
    }

    fn set(
        &self,
        key: &str,
        value: String,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send {
        async move {
            self.attempt("set", || self.inner.set(key, value.clone()))
                .await
        }
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, TankHubError>> + Send {
        self.attempt("delete", move || self.inner.delete(key))
    }

    fn delete_if_value(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = Result<bool, TankHubError>> + Send {
        let timeout = self.policy.timeout;
        let call = self.inner.delete_if_value(key, expected);
        async move {
            tokio::time::timeout(timeout, call)
                .await
                .map_err(TankHubError::storage)?
        }
    }

    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<(String, String)>, TankHubError>> + Send {
        self.attempt("scan_prefix", move || self.inner.scan_prefix(prefix))
    }

    fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<bool, TankHubError>> + Send {
        let timeout = self.policy.timeout;
        let call = self.inner.set_if_absent(key, value, ttl);
        async move {
            tokio::time::timeout(timeout, call)
                .await
                .map_err(TankHubError::storage)?
        }
    }
}
