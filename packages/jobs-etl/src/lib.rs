//! Resilient Job Posting Extraction and Load
//!
//! Pulls job postings from a paginated search API (USAJOBS), validates and
//! normalizes them, and upserts them into PostgreSQL keyed by position URI,
//! with at-least-once, idempotent semantics.
//!
//! # Flow
//!
//! ```text
//! Orchestrator ─▶ ApiPaginator ─▶ RetryPolicy ─▶ CircuitBreaker ─▶ SearchSource
//!      │
//!      ├─▶ RecordValidator (RawRecord → JobPosting)
//!      └─▶ UpsertStore (batched upserts, run audit log)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use jobs_etl::{EtlConfig, Orchestrator, PostgresStore, UsaJobsSource};
//!
//! let config = EtlConfig::from_env()?;
//! let source = UsaJobsSource::new(config.source.clone())?;
//! let store = PostgresStore::new(config.database.url.expose(), config.database.max_connections).await?;
//! store.migrate().await?;
//!
//! let orchestrator = Orchestrator::new(source, store, &config.pipeline);
//! let metadata = orchestrator.run(&config.query).await?;
//! println!("{} records persisted", metadata.records_persisted);
//! ```
//!
//! # Modules
//!
//! - [`resilience`] - Circuit breaker, retry policy, call spacing
//! - [`paginator`] - Lazy page stream over a search source
//! - [`validator`] - Raw record validation and normalization
//! - [`stores`] - Storage implementations (MemoryStore, PostgresStore)
//! - [`sources`] - Search sources (UsaJobsSource, MockSource)
//! - [`orchestrator`] - One full run end to end
//! - [`testing`] - Fixture builders for tests

pub mod config;
pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod paginator;
pub mod resilience;
pub mod sources;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;
pub mod validator;

// Re-export core types at crate root
pub use config::{
    CircuitBreakerConfig, DatabaseConfig, EtlConfig, PipelineConfig, RetryConfig, RunConfig,
    SourceConfig,
};
pub use credentials::SecretString;
pub use error::{
    ApiError, BatchFailure, CircuitOpenError, EtlError, FailureKind, PersistenceError,
    RunFailure, ValidationError,
};
pub use traits::{source::SearchSource, store::UpsertStore};
pub use types::{
    posting::{BatchReport, JobPosting, PostingStats, StoredPosting, UpsertOutcome},
    query::SearchQuery,
    record::{RawRecord, SearchPage},
    run::{RunMetadata, RunStatus},
};

pub use orchestrator::Orchestrator;
pub use paginator::ApiPaginator;
pub use resilience::{CircuitBreaker, CircuitState, RetryPolicy, Throttle};
pub use validator::RecordValidator;

// Re-export implementations
pub use sources::{MockSource, UsaJobsSource};
pub use stores::{MemoryStore, PostgresStore};
