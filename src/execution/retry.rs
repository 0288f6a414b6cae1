use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use crate::chain::types::ChainError;

/// Errors the retry loop knows how to classify and synthesize on timeout.
pub trait RetryableError: std::fmt::Display {
    fn is_transient(&self) -> bool {
        true
    }

    fn timed_out(after: Duration) -> Self;
}

impl RetryableError for anyhow::Error {
    fn timed_out(after: Duration) -> Self {
        anyhow::anyhow!("timed out after {:?}", after)
    }
}

impl RetryableError for ChainError {
    fn is_transient(&self) -> bool {
        matches!(self, ChainError::Rpc(_) | ChainError::Timeout(_))
    }

    fn timed_out(after: Duration) -> Self {
        ChainError::Timeout(after)
    }
}

/// Bounded timeout per attempt plus capped, jittered exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }

    #[cfg(test)]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4);
        capped + Duration::from_millis(jitter_ms)
    }

    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(E::timed_out(self.timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_transient() => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
