//! Timeout and retry policy for model invocations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::InvokeError;

/// Per-call timeout plus exponential backoff between attempts.
///
/// Only transient errors are retried. The wait after the `n`-th failed
/// attempt is `2^(n-1)` seconds clamped to `[min_wait, max_wait]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
        Duration::from_secs(1)
            .saturating_mul(exp)
            .clamp(self.min_wait, self.max_wait.max(self.min_wait))
    }

    /// Run `op` under the policy. The last transient error is returned once
    /// attempts are exhausted; any other error is returned at once.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InvokeError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(InvokeError::Timeout),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        label, attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
