//! Bounded retries with exponential back-off.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::RetryConfig;
use crate::error::{ApiError, ApiResult};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::throttle::Throttle;

/// Retries one outbound call on transient failure.
///
/// Each attempt waits for the throttle and runs through the circuit breaker.
/// A breaker rejection consumes an attempt without invoking the operation.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    breaker: Arc<CircuitBreaker>,
    throttle: Throttle,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, breaker: Arc<CircuitBreaker>) -> Self {
        let throttle = Throttle::new(config.min_spacing);
        Self {
            config,
            breaker,
            throttle,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Back-off after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget runs out (reported as [`ApiError::Exhausted`]).
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let call = &mut operation;
            let throttle = &self.throttle;
            let result = self
                .breaker
                .guard(move || async move {
                    throttle.until_ready().await;
                    call().await
                })
                .await;

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.kind().should_retry() {
                warn!(attempt, error = %err, "Permanent failure, not retrying");
                return Err(err);
            }

            if attempt >= max_attempts {
                error!(attempts = attempt, error = %err, "Retry budget exhausted");
                return Err(ApiError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = err
                .retry_after()
                .unwrap_or_else(|| self.delay_for_attempt(attempt));
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
