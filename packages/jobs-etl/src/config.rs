//! Startup configuration.
//!
//! Loaded once from environment variables (a `.env` file is honoured in
//! development) and passed by reference into the components; nothing in the
//! engine reads the environment after startup.

use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::credentials::SecretString;
use crate::sources::usajobs::{DEFAULT_BASE_URL, DEFAULT_USER_AGENT, MAX_RESULTS_PER_PAGE};
use crate::types::query::{SearchQuery, DEFAULT_RESULTS_PER_PAGE};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub query: SearchQuery,
    pub pipeline: PipelineConfig,
}

/// Search API connection settings.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl SourceConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: SecretString::new(api_key),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Persistence target settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL (embeds the password, hence secret)
    pub url: SecretString,
    pub max_connections: u32,
}

/// Retry budget and back-off for one outbound call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Growth factor applied per further attempt
    pub multiplier: f64,
    /// Upper bound for computed delays
    pub max_delay: Duration,
    /// Minimum spacing between any two outbound calls
    pub min_spacing: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            min_spacing: Duration::from_millis(1500),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the minimum spacing between calls; zero disables throttling.
    pub fn with_min_spacing(mut self, spacing: Duration) -> Self {
        self.min_spacing = spacing;
        self
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures inside `window` that open the circuit
    pub failure_threshold: u32,
    /// Rolling window for counting failures
    pub window: Duration,
    /// How long the circuit stays open before a trial call
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Per-run limits.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Validated records per `upsert_many` call
    pub batch_size: usize,
    /// Pagination safety bound
    pub max_pages: u32,
    /// Optional wall-clock limit for the whole run
    pub deadline: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_pages: 20,
            deadline: None,
        }
    }
}

impl RunConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Everything the orchestrator needs besides its collaborators.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub run: RunConfig,
}

impl EtlConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };

        let source = SourceConfig {
            base_url: env.string_or("USAJOBS_BASE_URL", DEFAULT_BASE_URL),
            api_key: SecretString::new(env.required("USAJOBS_API_KEY")?),
            user_agent: env.string_or("USAJOBS_USER_AGENT", DEFAULT_USER_AGENT),
            timeout: Duration::from_secs(env.parse_or("HTTP_TIMEOUT_SECS", 30u64)?),
        };

        let database = DatabaseConfig {
            url: SecretString::new(match env.get("DATABASE_URL") {
                Some(url) => url,
                None => format!(
                    "postgres://{}:{}@{}:{}/{}",
                    env.string_or("POSTGRES_USER", "postgres"),
                    env.string_or("POSTGRES_PASSWORD", "postgres"),
                    env.string_or("POSTGRES_HOST", "localhost"),
                    env.parse_or("POSTGRES_PORT", 5432u16)?,
                    env.string_or("POSTGRES_DB", "usajobs"),
                ),
            }),
            max_connections: env.parse_or("DB_MAX_CONNECTIONS", 5u32)?,
        };

        let results_per_page: u32 = env.parse_or("RESULTS_PER_PAGE", DEFAULT_RESULTS_PER_PAGE)?;
        let mut query = SearchQuery::new(env.string_or("SEARCH_KEYWORD", "data engineering"))
            .with_page_size(results_per_page.min(MAX_RESULTS_PER_PAGE));
        if let Some(location) = env.get("SEARCH_LOCATION") {
            query = query.with_location(location);
        }

        let retry = RetryConfig {
            max_attempts: env.parse_or("RETRY_MAX_ATTEMPTS", 3u32)?,
            initial_delay: Duration::from_millis(env.parse_or("RETRY_INITIAL_DELAY_MS", 2000u64)?),
            multiplier: env.parse_or("RETRY_MULTIPLIER", 2.0f64)?,
            max_delay: Duration::from_millis(env.parse_or("RETRY_MAX_DELAY_MS", 60_000u64)?),
            min_spacing: Duration::from_millis(env.parse_or("API_DELAY_MS", 1500u64)?),
        };
        if retry.max_attempts == 0 {
            bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            bail!("RETRY_MULTIPLIER must be a finite number >= 1.0");
        }

        let circuit_breaker = CircuitBreakerConfig {
            failure_threshold: env.parse_or("BREAKER_FAILURE_THRESHOLD", 5u32)?,
            window: Duration::from_secs(env.parse_or("BREAKER_WINDOW_SECS", 60u64)?),
            cooldown: Duration::from_secs(env.parse_or("BREAKER_COOLDOWN_SECS", 60u64)?),
        };
        if circuit_breaker.failure_threshold == 0 {
            bail!("BREAKER_FAILURE_THRESHOLD must be at least 1");
        }

        let run = RunConfig {
            batch_size: env.parse_or("BATCH_SIZE", 100usize)?,
            max_pages: env.parse_or("MAX_PAGES", 20u32)?,
            // 0 disables the deadline
            deadline: env
                .parse_opt::<u64>("RUN_DEADLINE_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };
        if run.batch_size == 0 {
            bail!("BATCH_SIZE must be at least 1");
        }

        Ok(Self {
            source,
            database,
            query,
            pipeline: PipelineConfig {
                retry,
                circuit_breaker,
                run,
            },
        })
    }
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get(key).with_context(|| format!("{key} must be set"))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_opt<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .with_context(|| format!("{key} must be a valid number, got {raw:?}"))
            })
            .transpose()
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }
}
