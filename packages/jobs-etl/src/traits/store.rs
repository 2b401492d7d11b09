//! Storage trait for canonical postings and run audit records.

use async_trait::async_trait;
use tracing::warn;

use crate::error::{BatchFailure, PersistenceResult};
use crate::types::{
    posting::{BatchReport, JobPosting, PostingStats, StoredPosting, UpsertOutcome},
    run::RunMetadata,
};

/// Idempotent persistence keyed by `position_uri`.
#[async_trait]
pub trait UpsertStore: Send + Sync {
    /// Insert the posting, or update every mutable field of the row with the
    /// same `position_uri`.
    ///
    /// `extracted_at` and `created_at` are never overwritten; `updated_at`
    /// advances on every call.
    async fn upsert(&self, posting: &JobPosting) -> PersistenceResult<UpsertOutcome>;

    /// Upsert each posting independently.
    ///
    /// Per-record failures are collected in the report and the remaining
    /// postings are still attempted. A fatal (connection) error stops the
    /// batch; the failure carries the report of what was written before it.
    async fn upsert_many(&self, postings: &[JobPosting]) -> Result<BatchReport, BatchFailure> {
        let mut report = BatchReport::default();
        for posting in postings {
            match self.upsert(posting).await {
                Ok(outcome) => report.record(outcome),
                Err(error) if error.is_fatal() => {
                    return Err(BatchFailure { report, error });
                }
                Err(e) => {
                    warn!(uri = %posting.position_uri, error = %e, "Failed to persist posting");
                    report.failures.push(e);
                }
            }
        }
        Ok(report)
    }

    /// Append an immutable audit entry for a finished run.
    async fn record_run(&self, metadata: &RunMetadata) -> PersistenceResult<()>;

    /// Get a stored posting by its natural key.
    async fn get_posting(&self, position_uri: &str) -> PersistenceResult<Option<StoredPosting>>;

    /// Count stored postings.
    async fn count_postings(&self) -> PersistenceResult<u64>;

    /// Aggregate figures over stored postings.
    async fn statistics(&self) -> PersistenceResult<PostingStats>;

    /// Most recent audit entries, newest first.
    async fn recent_runs(&self, limit: usize) -> PersistenceResult<Vec<RunMetadata>>;
}
