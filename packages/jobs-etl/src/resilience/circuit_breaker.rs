//! Circuit breaker gating outbound calls to the search API.
//!
//! ```text
//!   CLOSED ──(threshold failures within window)──▶ OPEN
//!     ▲                                              │
//!     │ trial succeeds                      cooldown elapses
//!     │                                              ▼
//!     └──────────────────────────────────────── HALF_OPEN
//!                     trial fails: back to OPEN, cooldown restarts
//! ```
//!
//! Time is read from `tokio::time::Instant`, so tests can drive the state
//! machine with a paused clock.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::CircuitOpenError;

/// Health of the guarded dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct BreakerInner {
    state: CircuitState,
    /// Failure timestamps inside the rolling window (CLOSED only)
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Stops calling a dependency that keeps failing.
///
/// Every failure reported through [`guard`](Self::guard) counts, regardless
/// of its class; the breaker never inspects or alters the error itself.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Does not advance OPEN to HALF_OPEN; that happens when
    /// the next call is attempted.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Failures counted toward the threshold right now.
    pub fn failure_count(&self) -> usize {
        let mut inner = self.lock();
        self.prune(&mut inner, Instant::now());
        inner.failures.len()
    }

    /// Run `operation` if the circuit allows it.
    ///
    /// A rejected call returns `CircuitOpenError` (converted into `E`)
    /// without invoking `operation`. Otherwise the outcome is recorded before
    /// it is returned unchanged.
    pub async fn guard<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let permit = self.acquire().map_err(E::from)?;
        let result = operation().await;
        match &result {
            Ok(_) => permit.succeeded(),
            Err(_) => permit.failed(),
        }
        result
    }

    fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= self.config.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(breaker = %self.name, "Circuit half-open, allowing trial call");
                    Ok(Permit::new(self, true))
                } else {
                    Err(CircuitOpenError {
                        retry_after: self.config.cooldown - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen if inner.trial_in_flight => Err(CircuitOpenError {
                retry_after: Duration::ZERO,
            }),
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.failures.clear();
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            inner.trial_in_flight = false;
            info!(breaker = %self.name, "Circuit closed after successful trial");
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => {
                inner.failures.push_back(now);
                self.prune(&mut inner, now);
                let count = inner.failures.len();
                debug!(breaker = %self.name, failures = count, "Recorded failure");

                if count >= self.config.failure_threshold as usize {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    inner.failures.clear();
                    warn!(
                        breaker = %self.name,
                        failures = count,
                        cooldown_secs = self.config.cooldown.as_secs_f64(),
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.trial_in_flight = false;
                warn!(breaker = %self.name, "Trial call failed, circuit re-opened");
            }
            // A call admitted before the circuit opened; nothing left to count
            CircuitState::Open => {}
        }
    }

    fn prune(&self, inner: &mut BreakerInner, now: Instant) {
        while let Some(oldest) = inner.failures.front() {
            if now.saturating_duration_since(*oldest) > self.config.window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

/// Admission for one call. Dropping an unsettled trial permit (the call was
/// cancelled) frees the HALF_OPEN slot again.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeeded(mut self) {
        self.settled = true;
        self.breaker.on_success();
    }

    fn failed(mut self) {
        self.settled = true;
        self.breaker.on_failure();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}
