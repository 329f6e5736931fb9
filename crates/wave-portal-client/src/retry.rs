//! Retry policy for idempotent chain reads.
//!
//! ```ignore
//! use wave_portal_client::retry::{RetryConfig, retry_with_classifier};
//!
//! let waves = retry_with_classifier(RetryConfig::for_reads(), "getAllWaves", || async {
//!     contract.read_all().await
//! }, WaveError::is_retryable).await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_READ_RETRY_DELAY_SECS};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub delay: Duration,
    /// Multiplier for exponential backoff. 1.0 = fixed delay, 2.0 = double each time.
    pub backoff_multiplier: f64,
    /// Maximum delay cap for exponential backoff.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_reads()
    }
}

impl RetryConfig {
    /// Create a fixed-delay retry configuration.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay,
            backoff_multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// Reads are cheap and idempotent: a few quick exponential attempts.
    pub fn for_reads() -> Self {
        Self::exponential(
            Duration::from_secs(DEFAULT_READ_RETRY_DELAY_SECS),
            DEFAULT_MAX_RETRY_ATTEMPTS,
            2.0,
            Duration::from_secs(30),
        )
    }

    /// Create an exponential backoff retry configuration.
    pub fn exponential(
        initial_delay: Duration,
        max_attempts: u32,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            delay: initial_delay,
            backoff_multiplier: multiplier,
            max_delay,
        }
    }

    /// Calculate delay for a given attempt number.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return self.delay;
        }

        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay_millis = (self.delay.as_millis() as f64 * multiplier) as u64;
        let delay = Duration::from_millis(delay_millis);

        std::cmp::min(delay, self.max_delay)
    }
}

/// Run `operation` until it succeeds, the classifier rejects its error, or
/// `config.max_attempts` attempts have been made (at least one always is).
pub async fn retry_with_classifier<F, Fut, T, E, C>(
    config: RetryConfig,
    operation_name: &str,
    operation: F,
    is_retryable: C,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        let error = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Read succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !is_retryable(&error) || attempt >= max_attempts {
            warn!(
                operation = operation_name,
                attempt,
                max_attempts,
                error = %error,
                "Giving up"
            );
            return Err(error);
        }

        let delay = config.delay_for_attempt(attempt);
        warn!(
            operation = operation_name,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Read failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
