use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ToolFlowError};

/// Retry schedule: the first attempt runs immediately, retry `n` waits
/// `initial_backoff * multiplier^(n-1)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    2.0
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: initial_backoff.as_millis() as u64,
            multiplier: default_multiplier(),
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn tool_default() -> Self {
        Self::new(1, Duration::from_millis(250))
    }

    pub fn generation_default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the given attempt (1-based). Attempt 1 never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::tool_default()
    }
}

/// Sleeps for `delay` unless the token fires first.
pub(crate) async fn backoff(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    if delay.is_zero() {
        return if cancel.is_cancelled() {
            Err(ToolFlowError::Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(ToolFlowError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Runs `task` under `limit`, mapping expiry to `None`.
pub(crate) async fn with_timeout<F, T>(limit: Duration, task: F) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, task).await.ok()
}
