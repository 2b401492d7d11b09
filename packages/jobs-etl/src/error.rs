//! Typed errors for the extraction-and-load engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can branch
//! on failure classes: the retry policy on [`FailureKind`], the orchestrator
//! on [`PersistenceError::is_fatal`].

use std::time::Duration;

use thiserror::Error;

use crate::types::{posting::BatchReport, run::RunMetadata};

/// How a failed call is treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Expected to resolve on retry (timeouts, 5xx, rate limiting, open circuit)
    Transient,
    /// Retry cannot fix it (4xx, malformed payload, exhausted budget)
    Permanent,
}

impl FailureKind {
    /// Whether this failure kind should trigger another attempt
    pub fn should_retry(&self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

/// Rejection issued by the circuit breaker without contacting the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker is open (retry after {retry_after:?})")]
pub struct CircuitOpenError {
    /// Time left until the breaker lets a trial call through.
    pub retry_after: Duration,
}

/// Errors raised while talking to the search API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request or response body timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure (DNS, refused, reset)
    #[error("network error: {0}")]
    Network(String),

    /// Upstream returned a 5xx
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Upstream returned 429, optionally with a wait hint
    #[error("rate limited by upstream (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Upstream returned a 4xx other than 429
    #[error("client error (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    /// Response body did not match the expected schema
    #[error("malformed response: {0}")]
    Schema(String),

    /// Call rejected by the circuit breaker
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// Every attempt allowed by the retry budget failed
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<ApiError>,
    },
}

impl ApiError {
    /// Classify an unsuccessful HTTP status.
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        let message = message.into();
        match status {
            429 => ApiError::RateLimited { retry_after },
            408 => ApiError::Timeout(format!("HTTP 408: {message}")),
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Client { status, message },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::Timeout(_)
            | ApiError::Network(_)
            | ApiError::Server { .. }
            | ApiError::RateLimited { .. }
            | ApiError::CircuitOpen(_) => FailureKind::Transient,
            ApiError::Client { .. } | ApiError::Schema(_) | ApiError::Exhausted { .. } => {
                FailureKind::Permanent
            }
        }
    }

    /// Server-provided wait hint, if the failure carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_decode() {
            ApiError::Schema(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status.as_u16(), err.to_string(), None)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Reasons a raw record cannot become a canonical posting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is absent or blank
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    /// The natural key is present but not an http(s) URL
    #[error("position URI is not an http(s) URL: {uri}")]
    InvalidUri { uri: String },
}

/// Errors raised by an [`UpsertStore`](crate::traits::store::UpsertStore).
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A single record could not be written; siblings are unaffected
    #[error("failed to persist {uri}: {message}")]
    Record { uri: String, message: String },

    /// A statement unrelated to one record failed
    #[error("storage query failed: {0}")]
    Query(String),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    Migration(String),

    /// The storage connection itself is unusable
    #[error("storage connection unusable: {0}")]
    Connection(String),
}

impl PersistenceError {
    /// Whether the failure makes every further write pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PersistenceError::Connection(_))
    }

    /// Classify a driver error raised while writing one record.
    pub fn for_record(err: sqlx::Error, uri: &str) -> Self {
        if is_connection_error(&err) {
            PersistenceError::Connection(err.to_string())
        } else {
            PersistenceError::Record {
                uri: uri.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        if is_connection_error(&err) {
            PersistenceError::Connection(err.to_string())
        } else {
            PersistenceError::Query(err.to_string())
        }
    }
}

impl From<sqlx::migrate::MigrateError> for PersistenceError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        PersistenceError::Migration(err.to_string())
    }
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Configuration(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// A batch cut short by a fatal storage error.
///
/// `report` holds the writes that were committed before the error.
#[derive(Debug, Error)]
#[error("batch aborted after {} writes: {error}", .report.persisted())]
pub struct BatchFailure {
    pub report: BatchReport,
    #[source]
    pub error: PersistenceError,
}

/// Run-fatal errors: they abort the run and reach the scheduler.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("extraction failed: {0}")]
    Api(#[from] ApiError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("run deadline of {}s exceeded", .deadline.as_secs_f64())]
    Timeout { deadline: Duration },
}

/// A run that ended on a run-fatal error.
///
/// Carries the finalized metadata so the scheduler always gets the audit
/// record, whether or not the run succeeded.
#[derive(Debug, Error)]
#[error("run {} ended with status {}: {error}", .metadata.run_id, .metadata.status)]
pub struct RunFailure {
    pub metadata: RunMetadata,
    #[source]
    pub error: EtlError,
}

/// Result type alias for API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Result type alias for storage operations.
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;
