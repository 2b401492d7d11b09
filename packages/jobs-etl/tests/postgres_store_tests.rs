//! PostgresStore against a real database.
//!
//! Run with: cargo test --test postgres_store_tests

mod common;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use common::TestHarness;
use jobs_etl::testing::{fast_pipeline_config, raw_record};
use jobs_etl::{
    EtlError, JobPosting, MockSource, Orchestrator, PersistenceError, RunMetadata, RunStatus,
    SearchQuery, UpsertOutcome, UpsertStore,
};
use test_context::test_context;

/// Postgres keeps microseconds; truncate so round trips compare equal.
fn now_micros() -> DateTime<Utc> {
    DateTime::from_timestamp_micros(Utc::now().timestamp_micros()).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn close_enough(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).abs() < ChronoDuration::milliseconds(1)
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_upsert_round_trip(ctx: &TestHarness) {
    let store = ctx.store();
    let uri = ctx.uri("round-trip");
    let posting = JobPosting::new("Data Engineer", &uri, now_micros())
        .with_location("Washington, DC, US")
        .with_organization("Office of Data")
        .with_dates(Some(date(2024, 1, 15)), Some(date(2024, 2, 15)));

    assert_eq!(store.upsert(&posting).await.unwrap(), UpsertOutcome::Inserted);
    let stored = store.get_posting(&uri).await.unwrap().unwrap();

    assert_eq!(stored.posting, posting);
    assert!(stored.id > 0);
    assert_eq!(stored.created_at, stored.updated_at);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_upsert_updates_in_place(ctx: &TestHarness) {
    let store = ctx.store();
    let uri = ctx.uri("update");
    let original = JobPosting::new("Data Engineer", &uri, now_micros());
    store.upsert(&original).await.unwrap();
    let first = store.get_posting(&uri).await.unwrap().unwrap();

    let mut changed = JobPosting::new("Senior Data Engineer", &uri, now_micros())
        .with_organization("Office of Data");
    changed.extracted_at = original.extracted_at + ChronoDuration::days(1);
    assert_eq!(store.upsert(&changed).await.unwrap(), UpsertOutcome::Updated);
    let second = store.get_posting(&uri).await.unwrap().unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.posting.position_title, "Senior Data Engineer");
    assert_eq!(second.posting.organization_name.as_deref(), Some("Office of Data"));
    assert_eq!(second.posting.extracted_at, original.extracted_at);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_repeat_upsert_keeps_one_row(ctx: &TestHarness) {
    let store = ctx.store();
    let posting = JobPosting::new("Data Engineer", ctx.uri("repeat"), now_micros());

    let before = store.count_postings().await.unwrap();
    store.upsert(&posting).await.unwrap();
    store.upsert(&posting).await.unwrap();
    store.upsert(&posting).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_postings WHERE position_uri = $1")
        .bind(&posting.position_uri)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert!(store.count_postings().await.unwrap() > before);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_batch_keeps_going_past_rejected_rows(ctx: &TestHarness) {
    let store = ctx.store();
    // Blank titles and inverted dates only get past the validator here
    let batch = vec![
        JobPosting::new("A", ctx.uri("batch-1"), now_micros()),
        JobPosting::new("   ", ctx.uri("batch-2"), now_micros()),
        JobPosting::new("C", ctx.uri("batch-3"), now_micros())
            .with_dates(Some(date(2024, 3, 1)), Some(date(2024, 1, 1))),
        JobPosting::new("D", ctx.uri("batch-4"), now_micros()),
    ];

    let report = store.upsert_many(&batch).await.unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f, PersistenceError::Record { .. })));
    assert!(store.get_posting(&ctx.uri("batch-4")).await.unwrap().is_some());
    assert!(store.get_posting(&ctx.uri("batch-2")).await.unwrap().is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_closed_pool_is_fatal(ctx: &TestHarness) {
    let store = ctx.store();
    ctx.db_pool.close().await;

    let err = store
        .upsert_many(&[JobPosting::new("A", ctx.uri("closed"), now_micros())])
        .await
        .unwrap_err();

    assert!(err.error.is_fatal());
    assert_eq!(err.report.persisted(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_run_log_round_trip(ctx: &TestHarness) {
    let store = ctx.store();
    let mut run = RunMetadata::start(&SearchQuery::new("data engineer").with_location("Denver"));
    run.record_page(3);
    run.record_rejection();
    run.complete();

    store.record_run(&run).await.unwrap();
    let runs = store.recent_runs(1000).await.unwrap();
    let loaded = runs.iter().find(|r| r.run_id == run.run_id).unwrap();

    assert_eq!(loaded.keyword, "data engineer");
    assert_eq!(loaded.location.as_deref(), Some("Denver"));
    assert_eq!(loaded.status, RunStatus::Partial);
    assert_eq!(loaded.pages_fetched, 1);
    assert_eq!(loaded.records_seen, 3);
    assert_eq!(loaded.records_rejected, 1);
    assert!(close_enough(loaded.started_at, run.started_at));
    assert!(close_enough(loaded.finished_at.unwrap(), run.finished_at.unwrap()));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_run_log_rejects_duplicates_and_unfinished_runs(ctx: &TestHarness) {
    let store = ctx.store();
    let mut run = RunMetadata::start(&SearchQuery::new("data"));

    assert!(store.record_run(&run).await.is_err());

    run.complete();
    store.record_run(&run).await.unwrap();
    assert!(store.record_run(&run).await.is_err());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_run_log_is_append_only(ctx: &TestHarness) {
    let store = ctx.store();
    let mut run = RunMetadata::start(&SearchQuery::new("data"));
    run.complete();
    store.record_run(&run).await.unwrap();

    let update = sqlx::query("UPDATE run_metadata SET status = 'failed' WHERE run_id = $1")
        .bind(run.run_id)
        .execute(&ctx.db_pool)
        .await;
    let delete = sqlx::query("DELETE FROM run_metadata WHERE run_id = $1")
        .bind(run.run_id)
        .execute(&ctx.db_pool)
        .await;

    assert!(update.is_err());
    assert!(delete.is_err());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_statistics_cover_new_postings(ctx: &TestHarness) {
    let store = ctx.store();
    let organization = format!("Agency {}", ctx.test_id);
    let before = store.statistics().await.unwrap();

    for i in 0..3 {
        let posting = JobPosting::new("Analyst", ctx.uri(&format!("stats-{i}")), now_micros())
            .with_organization(&organization);
        store.upsert(&posting).await.unwrap();
    }
    let after = store.statistics().await.unwrap();

    assert!(after.total_postings >= before.total_postings + 3);
    assert!(after.unique_organizations > before.unique_organizations);
    assert!(after.postings_this_week >= 3);
    assert!(after.first_created_at <= after.last_created_at);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_migrations_are_idempotent(ctx: &TestHarness) {
    ctx.store().migrate().await.unwrap();
    ctx.store().migrate().await.unwrap();
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_rerun_against_postgres_is_idempotent(ctx: &TestHarness) {
    let records: Vec<_> = (0..4)
        .map(|i| raw_record(&format!("Engineer {i}"), &ctx.uri(&format!("e2e-{i}"))))
        .collect();
    // Two full pages then the empty end-of-results page, once per run
    let script = [records[..2].to_vec(), records[2..].to_vec(), Vec::new()];
    let source = MockSource::new()
        .with_pages(script.clone())
        .with_pages(script);
    let orchestrator = Orchestrator::new(source, ctx.store(), &fast_pipeline_config());
    let query = SearchQuery::new("engineer").with_page_size(2);

    let first = orchestrator.run(&query).await.unwrap();
    let second = orchestrator.run(&query).await.unwrap();

    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(first.records_inserted, 4);
    assert_eq!(second.records_updated, 4);
    assert_eq!(second.records_inserted, 0);
    assert_eq!(orchestrator.source().call_count(), 6);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM job_postings WHERE position_uri LIKE $1")
            .bind(format!("%/{}/e2e-%", ctx.test_id))
            .fetch_one(&ctx.db_pool)
            .await
            .unwrap();
    assert_eq!(count, 4);

    let stored = ctx.store().get_posting(&ctx.uri("e2e-0")).await.unwrap().unwrap();
    assert_eq!(stored.posting.position_location.as_deref(), Some("Washington, DC, US"));
    assert_eq!(stored.posting.position_start_date, Some(date(2024, 1, 15)));
    assert_eq!(stored.posting.position_end_date, Some(date(2024, 2, 15)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_run_into_closed_pool_fails(ctx: &TestHarness) {
    let source = MockSource::new().with_page(vec![raw_record("A", &ctx.uri("lost-1"))]);
    let orchestrator = Orchestrator::new(source, ctx.store(), &fast_pipeline_config());
    ctx.db_pool.close().await;

    let failure = orchestrator
        .run(&SearchQuery::new("data").with_page_size(10))
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        EtlError::Persistence(PersistenceError::Connection(_))
    ));
    assert_eq!(failure.metadata.status, RunStatus::Failed);
}
