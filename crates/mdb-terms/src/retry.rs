//! Bounded retries with exponential backoff around snapshot fetches.

use std::time::Duration;

use rand::Rng;

use crate::error::{ReconcileError, SourceError};
use crate::snapshot::TermSnapshot;
use crate::source::TermSource;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of each delay randomized in either direction.
    pub jitter: f64,
    /// Bound on a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after failed attempt number `attempt` (1-based),
    /// before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
        delay.mul_f64(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub snapshot: TermSnapshot,
    pub attempts: u32,
}

/// Fetch a snapshot, retrying transient failures per `policy`.
#[tracing::instrument(skip(source, policy), fields(source = %source.name()), err)]
pub async fn fetch_with_retry(
    source: &dyn TermSource,
    model: &str,
    version: &str,
    policy: &RetryPolicy,
) -> Result<Fetched, ReconcileError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout, source.fetch_snapshot(model, version)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                source_name: source.name().to_string(),
                elapsed_ms: policy.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(snapshot) => {
                tracing::debug!(attempt, entries = snapshot.entries.len(), "snapshot fetched");
                return Ok(Fetched {
                    snapshot,
                    attempts: attempt,
                });
            }
            Err(error) if !error.is_retryable() => {
                return Err(ReconcileError::InvalidSnapshot {
                    model: model.to_string(),
                    error,
                });
            }
            Err(error) if attempt >= max_attempts => {
                return Err(ReconcileError::SourceUnavailable {
                    model: model.to_string(),
                    attempts: attempt,
                    last: error,
                });
            }
            Err(error) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "snapshot fetch failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
