//! Resilience primitives wrapped around every outbound search call.
//!
//! - [`CircuitBreaker`]: stops calling an upstream that keeps failing
//! - [`RetryPolicy`]: bounded exponential back-off, throttled and guarded
//!   by the breaker
//! - [`Throttle`]: minimum spacing between calls

pub mod circuit_breaker;
pub mod retry;
pub mod throttle;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use retry::RetryPolicy;
pub use throttle::Throttle;
