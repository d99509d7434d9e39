use crate::sync::config::{SOURCE_RETRY_INTERVAL_SECS, SOURCE_RETRY_MAX_ATTEMPTS};
use crate::sync::util::pause;
use anyhow::Result;
use std::time::Duration;

/// Fixed-interval retry: enough attempts to ride out a day-long outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: SOURCE_RETRY_MAX_ATTEMPTS,
            interval: Duration::from_secs(SOURCE_RETRY_INTERVAL_SECS),
        }
    }
}

/// Run `op` until it succeeds or the attempt ceiling is reached.
///
/// Returns `None` after the last failed attempt; no sleep follows it.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> Result<T>,
) -> Option<T> {
    for attempt in 1..=policy.max_attempts {
        match op() {
            Ok(value) => return Some(value),
            Err(err) => {
                tracing::error!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %format!("{err:#}"),
                    "failed to fetch {what}",
                );
                if attempt < policy.max_attempts {
                    pause(policy.interval);
                }
            }
        }
    }
    tracing::error!(max_attempts = policy.max_attempts, "giving up on {what}");
    None
}
