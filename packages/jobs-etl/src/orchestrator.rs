//! One full extraction cycle: paginate → validate → batch upsert → audit.

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{PipelineConfig, RunConfig};
use crate::error::{BatchFailure, EtlError, RunFailure};
use crate::paginator::ApiPaginator;
use crate::resilience::{CircuitBreaker, RetryPolicy};
use crate::traits::{source::SearchSource, store::UpsertStore};
use crate::types::{posting::JobPosting, query::SearchQuery, run::RunMetadata};
use crate::validator::RecordValidator;

/// Sequences paginator, validator and store for one run at a time.
///
/// A run is a single sequential task: pages are fetched one after another and
/// every batch is written before the next page is requested. Overlapping runs
/// are not coordinated here.
pub struct Orchestrator<S, St> {
    paginator: ApiPaginator<S>,
    validator: RecordValidator,
    store: St,
    breaker: Arc<CircuitBreaker>,
    config: RunConfig,
}

impl<S, St> Orchestrator<S, St>
where
    S: SearchSource,
    St: UpsertStore,
{
    pub fn new(source: S, store: St, config: &PipelineConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            "search-api",
            config.circuit_breaker.clone(),
        ));
        let retry = RetryPolicy::new(config.retry.clone(), breaker.clone());

        Self {
            paginator: ApiPaginator::new(source, retry, config.run.max_pages),
            validator: RecordValidator::new(),
            store,
            breaker,
            config: config.run.clone(),
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn source(&self) -> &S {
        self.paginator.source()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run one extraction cycle for `query`.
    ///
    /// Always finalizes and records the run metadata. A run-fatal error
    /// (exhausted page retries, lost storage connection, deadline) comes back
    /// as [`RunFailure`] carrying that metadata; per-record problems only
    /// show up in the counters and the `partial` status.
    #[instrument(skip(self, query), fields(keyword = %query.keyword))]
    pub async fn run(&self, query: &SearchQuery) -> Result<RunMetadata, RunFailure> {
        let mut metadata = RunMetadata::start(query);
        info!(
            run_id = %metadata.run_id,
            location = ?query.location,
            results_per_page = query.results_per_page,
            "Starting extraction run"
        );
        self.log_statistics("before run").await;

        let outcome = match self.config.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.drive(query, &mut metadata)).await {
                    Ok(result) => result,
                    Err(_) => Err(EtlError::Timeout { deadline }),
                }
            }
            None => self.drive(query, &mut metadata).await,
        };

        match &outcome {
            Ok(()) => metadata.complete(),
            Err(e) => {
                error!(run_id = %metadata.run_id, error = %e, "Run aborted");
                metadata.fail(e);
            }
        }

        let recorded = self.store.record_run(&metadata).await;
        self.log_statistics("after run").await;

        info!(
            run_id = %metadata.run_id,
            status = %metadata.status,
            pages = metadata.pages_fetched,
            seen = metadata.records_seen,
            persisted = metadata.records_persisted,
            inserted = metadata.records_inserted,
            updated = metadata.records_updated,
            rejected = metadata.records_rejected,
            failed = metadata.records_failed,
            duration_ms = ?metadata.duration().map(|d| d.num_milliseconds()),
            "Run finished"
        );

        match (outcome, recorded) {
            (Ok(()), Ok(())) => Ok(metadata),
            (Ok(()), Err(e)) => {
                error!(run_id = %metadata.run_id, error = %e, "Failed to record run metadata");
                Err(RunFailure {
                    metadata,
                    error: e.into(),
                })
            }
            (Err(error), recorded) => {
                if let Err(e) = recorded {
                    warn!(
                        run_id = %metadata.run_id,
                        error = %e,
                        "Failed to record metadata of aborted run"
                    );
                }
                Err(RunFailure { metadata, error })
            }
        }
    }

    async fn drive(&self, query: &SearchQuery, metadata: &mut RunMetadata) -> Result<(), EtlError> {
        let batch_size = self.config.batch_size.max(1);
        let mut batch: Vec<JobPosting> = Vec::with_capacity(batch_size);
        let mut pages = self.paginator.pages(query);

        while let Some(next) = pages.next().await {
            let page = match next {
                Ok(page) => page,
                Err(e) => {
                    // Keep what was validated before the failure
                    self.flush(&mut batch, metadata).await?;
                    return Err(e.into());
                }
            };

            metadata.record_page(page.result_count());
            debug!(page = page.page, records = page.result_count(), "Processing page");

            for raw in &page.records {
                match self.validator.validate(raw) {
                    Ok(posting) => {
                        batch.push(posting);
                        if batch.len() >= batch_size {
                            self.flush(&mut batch, metadata).await?;
                        }
                    }
                    Err(e) => {
                        warn!(page = page.page, error = %e, "Rejected record");
                        metadata.record_rejection();
                    }
                }
            }
        }

        self.flush(&mut batch, metadata).await
    }

    async fn flush(
        &self,
        batch: &mut Vec<JobPosting>,
        metadata: &mut RunMetadata,
    ) -> Result<(), EtlError> {
        if batch.is_empty() {
            return Ok(());
        }

        let report = match self.store.upsert_many(batch.as_slice()).await {
            Ok(report) => report,
            Err(BatchFailure { report, error }) => {
                // Rows committed before the connection dropped still count
                metadata.record_batch(&report);
                warn!(
                    size = batch.len(),
                    persisted = report.persisted(),
                    error = %error,
                    "Batch aborted"
                );
                batch.clear();
                return Err(error.into());
            }
        };
        debug!(
            size = batch.len(),
            inserted = report.inserted,
            updated = report.updated,
            failed = report.failures.len(),
            "Flushed batch"
        );
        metadata.record_batch(&report);
        batch.clear();
        Ok(())
    }

    async fn log_statistics(&self, when: &str) {
        match self.store.statistics().await {
            Ok(stats) => info!(
                when,
                total = stats.total_postings,
                organizations = stats.unique_organizations,
                today = stats.postings_today,
                this_week = stats.postings_this_week,
                "Posting statistics"
            ),
            Err(e) => warn!(when, error = %e, "Failed to load posting statistics"),
        }
    }
}
