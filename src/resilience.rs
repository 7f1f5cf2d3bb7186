// 🔁 Resilience Policy
// Bounded retries with exponential backoff around backend calls, plus an
// optional deadline over the whole retry sequence.

use crate::error::{ErrorKind, NormalizeError, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, the first call included
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
    /// Growth of the wait between consecutive retries
    pub backoff_factor: f64,
    /// Floor for the wait after the backend throttled us
    pub rate_limit_min_wait: Duration,
    /// Failure kinds worth another attempt
    pub retry_on: HashSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            min_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(30),
            backoff_factor: 2.0,
            rate_limit_min_wait: Duration::from_secs(2),
            retry_on: [ErrorKind::Adapter, ErrorKind::RateLimit].into_iter().collect(),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_waits(mut self, min_wait: Duration, max_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self.max_wait = max_wait;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_rate_limit_min_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_min_wait = wait;
        self
    }

    /// Replace the set of retry-eligible failure kinds
    pub fn with_retry_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(NormalizeError::Config("max attempts must be at least 1".to_string()));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(NormalizeError::Config(format!(
                "backoff factor must be a finite number >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.min_wait > self.max_wait {
            return Err(NormalizeError::Config(format!(
                "minimum wait {:?} exceeds maximum wait {:?}",
                self.min_wait, self.max_wait
            )));
        }
        Ok(())
    }
}

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResiliencePolicy {
    config: RetryConfig,
}

impl ResiliencePolicy {
    pub fn new(config: RetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(ResiliencePolicy { config })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn is_retryable(&self, error: &NormalizeError) -> bool {
        self.config.retry_on.contains(&error.kind())
    }

    /// Wait before retry number `retry` (1 for the first retry).
    ///
    /// `base * factor^(retry-1)`, kept within `[base, max_wait]`. The base is
    /// raised to `rate_limit_min_wait` for throttling, and a `retry_after`
    /// hint from the backend is honoured up to `max_wait`.
    pub fn delay_for(&self, retry: u32, error: &NormalizeError) -> Duration {
        let config = &self.config;
        let base = if error.kind() == ErrorKind::RateLimit {
            config.min_wait.max(config.rate_limit_min_wait)
        } else {
            config.min_wait
        }
        .min(config.max_wait);

        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = base.as_secs_f64() * config.backoff_factor.powi(exponent);
        let mut wait = Duration::from_secs_f64(scaled.min(config.max_wait.as_secs_f64()));

        if let Some(hint) = error.retry_after() {
            wait = wait.max(hint);
        }
        wait.clamp(base, config.max_wait)
    }

    /// Run `f` until it succeeds, fails with a non-eligible error, or the
    /// attempt budget is spent.
    pub async fn execute<F, Fut, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        self.run(operation, f, &attempts).await
    }

    /// Like `execute`, bounded by an overall deadline when one is given.
    ///
    /// Hitting the deadline abandons any pending backoff and reports
    /// `Timeout` with the number of attempts that were started.
    pub async fn execute_with_timeout<F, Fut, T>(
        &self,
        operation: &str,
        timeout: Option<Duration>,
        f: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(after) = timeout else {
            return self.execute(operation, f).await;
        };

        let attempts = AtomicU32::new(0);
        match tokio::time::timeout(after, self.run(operation, f, &attempts)).await {
            Ok(result) => result,
            Err(_) => {
                let attempts = attempts.load(Ordering::SeqCst);
                warn!(operation, attempts, timeout_ms = after.as_millis() as u64, "Request deadline reached");
                Err(NormalizeError::Timeout { after, attempts })
            }
        }
    }

    async fn run<F, Fut, T>(&self, operation: &str, mut f: F, attempts: &AtomicU32) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            attempts.store(attempt, Ordering::SeqCst);

            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) if !self.is_retryable(&error) => return Err(error),
                Err(error) if attempt >= max_attempts => {
                    warn!(operation, attempts = attempt, error = %error, "Retry budget exhausted");
                    return Err(NormalizeError::RetryExhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    });
                }
                Err(error) => {
                    let delay = self.delay_for(attempt, &error);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        ResiliencePolicy {
            config: RetryConfig::default(),
        }
    }
}
