use crate::config::StoreConfig;
use crate::error::StoreError;
use std::time::{Duration, Instant};

/// Bounded retry with exponential backoff for store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn reads(config: &StoreConfig) -> Self {
        Self {
            retries: config.read_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    pub fn writes(config: &StoreConfig) -> Self {
        Self { retries: config.write_retries, ..Self::reads(config) }
    }

    pub fn none() -> Self {
        Self { retries: 0, base: Duration::ZERO, max: Duration::ZERO }
    }

    /// Delay before retry number `attempt` (zero-based): base, 2·base, 4·base, ... capped at `max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Run `op`, retrying transient failures until the policy or the deadline is exhausted.
pub fn retry<T>(
    policy: &RetryPolicy,
    what: &str,
    deadline: Option<Instant>,
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.retries => {
                let delay = policy.backoff(attempt);
                if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                    return Err(err);
                }
                tracing::warn!(what, attempt, ?delay, error = %err, "store call failed, retrying");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
