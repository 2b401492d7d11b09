//! Minimum spacing between outbound calls, using the governor crate.

use governor::{Quota, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Lets one call through per `spacing`, without bursts.
///
/// A zero spacing disables throttling entirely.
#[derive(Clone)]
pub struct Throttle {
    limiter: Option<Arc<DefaultRateLimiter>>,
    spacing: Duration,
}

impl Throttle {
    pub fn new(spacing: Duration) -> Self {
        let limiter = Quota::with_period(spacing).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { limiter, spacing }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Wait until the next call is allowed.
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("spacing", &self.spacing)
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}
