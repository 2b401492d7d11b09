//! End-to-end runs over a scripted source and the in-memory store.

use std::time::Duration;

use jobs_etl::testing::{fast_pipeline_config, raw_record, raw_records};
use jobs_etl::{
    ApiError, CircuitBreakerConfig, CircuitState, EtlError, MemoryStore, MockSource,
    Orchestrator, PersistenceError, PipelineConfig, RunStatus, SearchQuery, UpsertStore,
};

fn server_error() -> ApiError {
    ApiError::Server {
        status: 503,
        message: "Service Unavailable".to_string(),
    }
}

fn orchestrator(
    source: MockSource,
    config: &PipelineConfig,
) -> Orchestrator<MockSource, MemoryStore> {
    Orchestrator::new(source, MemoryStore::new(), config)
}

#[tokio::test(start_paused = true)]
async fn test_two_full_pages_then_empty() {
    let records = raw_records("e2e", 4);
    let source = MockSource::new().with_pages([records[..2].to_vec(), records[2..].to_vec()]);
    let orchestrator = orchestrator(source, &fast_pipeline_config());

    let metadata = orchestrator
        .run(&SearchQuery::new("data engineer").with_page_size(2))
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Success);
    assert_eq!(metadata.pages_fetched, 2);
    assert_eq!(metadata.records_seen, 4);
    assert_eq!(metadata.records_persisted, 4);
    assert_eq!(metadata.records_inserted, 4);
    assert!(metadata.error_message.is_none());
    // Third request finds the empty page
    let pages: Vec<u32> = orchestrator.source().calls().iter().map(|c| c.page).collect();
    assert_eq!(pages, vec![1, 2, 3]);
    assert_eq!(orchestrator.store().posting_count(), 4);
    assert_eq!(orchestrator.store().runs(), vec![metadata]);
}

#[tokio::test(start_paused = true)]
async fn test_short_page_ends_pagination() {
    let source = MockSource::new()
        .with_page(raw_records("short", 3))
        .with_page(raw_records("never", 3));
    let orchestrator = orchestrator(source, &fast_pipeline_config());

    let metadata = orchestrator
        .run(&SearchQuery::new("data").with_page_size(10))
        .await
        .unwrap();

    assert_eq!(metadata.pages_fetched, 1);
    assert_eq!(metadata.records_persisted, 3);
    assert_eq!(orchestrator.source().call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_page_limit_bounds_the_run() {
    let source = MockSource::new().with_pages((0..5).map(|i| raw_records(&format!("p{i}"), 2)));
    let mut config = fast_pipeline_config();
    config.run = config.run.with_max_pages(2);
    let orchestrator = orchestrator(source, &config);

    let metadata = orchestrator
        .run(&SearchQuery::new("data").with_page_size(2))
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Success);
    assert_eq!(metadata.pages_fetched, 2);
    assert_eq!(orchestrator.source().call_count(), 2);
    assert_eq!(orchestrator.source().remaining(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rerun_updates_instead_of_duplicating() {
    let page = raw_records("rerun", 3);
    let source = MockSource::new().with_page(page.clone()).with_page(page);
    let orchestrator = orchestrator(source, &fast_pipeline_config());
    let query = SearchQuery::new("data").with_page_size(10);

    let first = orchestrator.run(&query).await.unwrap();
    let before = orchestrator.store().postings();
    let second = orchestrator.run(&query).await.unwrap();
    let after = orchestrator.store().postings();

    assert_eq!(first.records_inserted, 3);
    assert_eq!(second.records_inserted, 0);
    assert_eq!(second.records_updated, 3);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(after.len(), 3);
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(new.id, old.id);
        assert_eq!(new.created_at, old.created_at);
        assert_eq!(new.posting.extracted_at, old.posting.extracted_at);
    }
    assert_eq!(orchestrator.store().runs().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_records_are_counted_not_stored() {
    let good = raw_records("mixed", 2);
    let no_uri =
        raw_record("No Link", "https://www.usajobs.gov/job/x").without_field("PositionURI");
    let no_title = raw_record("", "https://www.usajobs.gov/job/untitled");
    let source =
        MockSource::new().with_page(vec![good[0].clone(), no_uri, no_title, good[1].clone()]);
    let orchestrator = orchestrator(source, &fast_pipeline_config());

    let metadata = orchestrator
        .run(&SearchQuery::new("data").with_page_size(10))
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Partial);
    assert_eq!(metadata.records_seen, 4);
    assert_eq!(metadata.records_rejected, 2);
    assert_eq!(metadata.records_persisted, 2);
    assert!(metadata.error_message.unwrap().contains("2 records rejected"));
    assert!(!orchestrator
        .store()
        .upserted_uris()
        .contains(&"https://www.usajobs.gov/job/untitled".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_date_does_not_reject() {
    let record = raw_record("Analyst", "https://www.usajobs.gov/job/dates")
        .with_field("PositionStartDate", "next tuesday");
    let source = MockSource::new().with_page(vec![record]);
    let orchestrator = orchestrator(source, &fast_pipeline_config());

    let metadata = orchestrator
        .run(&SearchQuery::new("data").with_page_size(10))
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Success);
    let stored = orchestrator
        .store()
        .get_posting("https://www.usajobs.gov/job/dates")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.posting.position_start_date, None);
    assert!(stored.posting.position_end_date.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_record_write_failure_makes_run_partial() {
    let records = raw_records("writes", 3);
    let source = MockSource::new().with_page(records);
    let orchestrator = orchestrator(source, &fast_pipeline_config());
    orchestrator.store().fail_on_uri("https://www.usajobs.gov/job/writes-1");

    let metadata = orchestrator
        .run(&SearchQuery::new("data").with_page_size(10))
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Partial);
    assert_eq!(metadata.records_failed, 1);
    assert_eq!(metadata.records_persisted, 2);
    assert_eq!(orchestrator.store().posting_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let source = MockSource::new()
        .with_failure(server_error())
        .with_failure(ApiError::Timeout("read timed out".to_string()))
        .with_page(raw_records("retry", 2));
    let orchestrator = orchestrator(source, &fast_pipeline_config());

    let metadata = orchestrator
        .run(&SearchQuery::new("data").with_page_size(10))
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Success);
    assert_eq!(metadata.records_persisted, 2);
    assert_eq!(orchestrator.source().call_count(), 3);
    assert_eq!(orchestrator.breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_page_keeps_earlier_pages() {
    let source = MockSource::new()
        .with_page(raw_records("kept", 2))
        .with_failure(server_error())
        .with_failure(server_error())
        .with_failure(server_error());
    let orchestrator = orchestrator(source, &fast_pipeline_config());

    let failure = orchestrator
        .run(&SearchQuery::new("data").with_page_size(2))
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        EtlError::Api(ApiError::Exhausted { attempts: 3, .. })
    ));
    assert_eq!(failure.metadata.status, RunStatus::Partial);
    assert_eq!(failure.metadata.records_persisted, 2);
    assert!(failure.metadata.error_message.is_some());
    assert_eq!(orchestrator.store().posting_count(), 2);
    assert_eq!(orchestrator.store().runs(), vec![failure.metadata]);
}

#[tokio::test(start_paused = true)]
async fn test_failure_before_any_write_fails_run() {
    let source = MockSource::new().with_failure(ApiError::Client {
        status: 401,
        message: "Unauthorized".to_string(),
    });
    let orchestrator = orchestrator(source, &fast_pipeline_config());

    let failure = orchestrator.run(&SearchQuery::new("data")).await.unwrap_err();

    assert!(matches!(failure.error, EtlError::Api(ApiError::Client { status: 401, .. })));
    assert_eq!(failure.metadata.status, RunStatus::Failed);
    // Permanent failures are not retried
    assert_eq!(orchestrator.source().call_count(), 1);
    assert_eq!(orchestrator.store().runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_stops_calling_upstream() {
    let source = MockSource::new()
        .with_failure(server_error())
        .with_failure(server_error())
        .with_page(raw_records("late", 1));
    let mut config = fast_pipeline_config();
    config.circuit_breaker = CircuitBreakerConfig::default()
        .with_failure_threshold(2)
        .with_cooldown(Duration::from_secs(60));
    let orchestrator = orchestrator(source, &config);
    let query = SearchQuery::new("data").with_page_size(10);

    let failure = orchestrator.run(&query).await.unwrap_err();

    match failure.error {
        EtlError::Api(ApiError::Exhausted { last, .. }) => {
            assert!(matches!(*last, ApiError::CircuitOpen(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(orchestrator.source().call_count(), 2);
    assert_eq!(orchestrator.breaker().state(), CircuitState::Open);

    // Still open: the next run fails fast without touching the source
    let again = orchestrator.run(&query).await.unwrap_err();
    assert_eq!(again.metadata.status, RunStatus::Failed);
    assert_eq!(orchestrator.source().call_count(), 2);

    // After the cooldown one trial call is let through and closes it
    tokio::time::advance(Duration::from_secs(61)).await;
    let recovered = orchestrator.run(&query).await.unwrap();
    assert_eq!(recovered.records_persisted, 1);
    assert_eq!(orchestrator.breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_lost_connection_aborts_run() {
    let source = MockSource::new().with_page(raw_records("lost", 3));
    let orchestrator = orchestrator(source, &fast_pipeline_config());
    orchestrator.store().set_connection_lost(true);

    let failure = orchestrator
        .run(&SearchQuery::new("data").with_page_size(10))
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        EtlError::Persistence(PersistenceError::Connection(_))
    ));
    assert_eq!(failure.metadata.status, RunStatus::Failed);
    // One attempt, then the batch is abandoned
    assert_eq!(orchestrator.store().upserted_uris().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_slow_run() {
    let source = MockSource::new()
        .with_page(raw_records("slow", 2))
        .with_latency(Duration::from_secs(10));
    let mut config = fast_pipeline_config();
    config.run = config.run.with_deadline(Duration::from_secs(5));
    let orchestrator = orchestrator(source, &config);

    let failure = orchestrator
        .run(&SearchQuery::new("data").with_page_size(10))
        .await
        .unwrap_err();

    assert!(matches!(failure.error, EtlError::Timeout { .. }));
    assert_eq!(failure.metadata.status, RunStatus::Failed);
    assert_eq!(orchestrator.store().posting_count(), 0);
    assert_eq!(orchestrator.store().runs()[0].status, RunStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_page_size_is_capped_by_source() {
    let source = MockSource::new().with_max_page_size(3);
    let orchestrator = orchestrator(source, &fast_pipeline_config());

    let metadata = orchestrator
        .run(&SearchQuery::new("data").with_page_size(1000))
        .await
        .unwrap();

    assert_eq!(metadata.pages_fetched, 0);
    assert_eq!(orchestrator.source().calls()[0].results_per_page, 3);
}

#[tokio::test(start_paused = true)]
async fn test_connection_lost_mid_batch_counts_committed_rows() {
    let source = MockSource::new().with_page(raw_records("midway", 5));
    let orchestrator = orchestrator(source, &fast_pipeline_config());
    orchestrator.store().lose_connection_after(3);

    let failure = orchestrator
        .run(&SearchQuery::new("data").with_page_size(10))
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        EtlError::Persistence(PersistenceError::Connection(_))
    ));
    assert_eq!(orchestrator.store().posting_count(), 3);
    assert_eq!(failure.metadata.records_persisted, 3);
    assert_eq!(failure.metadata.records_inserted, 3);
    assert_eq!(failure.metadata.status, RunStatus::Partial);
}
