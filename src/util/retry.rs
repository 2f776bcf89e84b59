//! Bounded retry with linear backoff for network-class failures.

use std::time::Duration;

use crate::config::{RETRY_DELAY_MS, RETRY_MAX};
use crate::error::ErrorKind;
use crate::pipeline::RequestContext;
use crate::transport::Method;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of re-issues after the first attempt.
    pub max_retries: u32,
    /// Base delay; the n-th retry waits `delay * n`.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: RETRY_MAX,
            delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Whether a request that already retried `retry_count` times may go again.
    ///
    /// Never true for the refresh endpoint, so a failing refresh cannot loop.
    pub fn is_eligible(&self, method: Method, is_refresh_call: bool, retry_count: u32) -> bool {
        method.is_idempotent() && !is_refresh_call && retry_count < self.max_retries
    }

    /// Wait before the `retry_count`-th retry.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        self.delay.saturating_mul(retry_count)
    }

    /// Decide on the next retry, bumping `ctx.retry_count` when one is due.
    pub fn next_delay(
        &self,
        kind: ErrorKind,
        method: Method,
        is_refresh_call: bool,
        ctx: &mut RequestContext,
    ) -> Option<Duration> {
        if kind != ErrorKind::NetworkTransient
            || !self.is_eligible(method, is_refresh_call, ctx.retry_count)
        {
            return None;
        }
        ctx.retry_count += 1;
        let delay = self.delay_for(ctx.retry_count);

        tracing::warn!(
            request_id = %ctx.id,
            attempt = ctx.retry_count,
            max_retries = self.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying after network error"
        );
        Some(delay)
    }
}
