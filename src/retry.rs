//! Bounded retry for remote calls and the polling policy for long-running jobs.

use crate::error::{MemeError, MemeResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff for transient provider failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Same backoff settings under another operation name.
    pub fn named(&self, operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..self.clone()
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let spread = delay.as_millis() as u64 / 4;
        if spread == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=spread);
        delay + Duration::from_millis(jitter)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
pub async fn retry_async<F, Fut, T>(config: &RetryConfig, operation: F) -> MemeResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = MemeResult<T>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.jittered(attempt - 1);
                crate::logw(format!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    config.operation_name, attempt, delay, e
                ));
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!(
                    "{} gave up after {} attempt(s): {}",
                    config.operation_name,
                    attempt + 1,
                    e
                );
                return Err(e);
            }
        }
    }
}

/// How the pipeline waits on an asynchronous video job.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Total time allowed between submission and completion.
    pub max_wait: Duration,
    /// Interval multiplier applied after every pending check; 1.0 keeps it fixed.
    pub backoff: f64,
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            max_wait: Duration::from_secs(900),
            backoff: 1.0,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval,
            max_wait,
            backoff: 1.0,
            max_interval: interval,
        }
    }

    /// Wait before the check following `pending_checks` not-done answers.
    pub fn delay_after(&self, pending_checks: u32) -> Duration {
        if self.backoff <= 1.0 || pending_checks <= 1 {
            return self.interval;
        }
        let factor = self.backoff.powi(pending_checks.saturating_sub(1) as i32);
        let scaled = self.interval.mul_f64(factor.min(1_000.0));
        scaled.min(self.max_interval.max(self.interval))
    }
}

pub(crate) fn timeout_error(scene: usize, waited: Duration) -> MemeError {
    MemeError::GenerationTimeout {
        scene,
        waited_secs: waited.as_secs(),
    }
}
