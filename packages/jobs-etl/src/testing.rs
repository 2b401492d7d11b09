//! Fixture builders for tests.
//!
//! Produce USAJOBS-shaped raw records and canonical postings, plus a pipeline
//! configuration without delays so tests run on a paused clock.

use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{CircuitBreakerConfig, PipelineConfig, RetryConfig, RunConfig};
use crate::types::{posting::JobPosting, record::RawRecord};

/// A complete `MatchedObjectDescriptor` for a posting.
pub fn descriptor(title: &str, uri: &str) -> Value {
    json!({
        "PositionID": "TEST-0001",
        "PositionTitle": title,
        "PositionURI": uri,
        "PositionLocation": [
            { "CityName": "Washington", "StateCode": "DC", "CountryCode": "US" }
        ],
        "PositionRemuneration": [
            { "MinimumRange": "80000", "MaximumRange": "120000", "RateIntervalCode": "Per Year" }
        ],
        "OrganizationName": "Office of Data",
        "DepartmentName": "Department of Testing",
        "JobCategory": [ { "Name": "Information Technology Management", "Code": "2210" } ],
        "JobGrade": [ { "Code": "GS" } ],
        "PositionStartDate": "2024-01-15T00:00:00.0000",
        "PositionEndDate": "2024-02-15T23:59:59.9970"
    })
}

/// A raw record built from [`descriptor`].
pub fn raw_record(title: &str, uri: &str) -> RawRecord {
    RawRecord::from_value(descriptor(title, uri), Utc::now())
}

/// `n` valid raw records with URIs unique per `prefix`.
pub fn raw_records(prefix: &str, n: usize) -> Vec<RawRecord> {
    (0..n)
        .map(|i| {
            raw_record(
                &format!("Data Engineer {prefix}-{i}"),
                &format!("https://www.usajobs.gov/job/{prefix}-{i}"),
            )
        })
        .collect()
}

/// A canonical posting with only the required fields.
pub fn posting(title: &str, uri: &str) -> JobPosting {
    JobPosting::new(title, uri, Utc::now())
}

/// Pipeline settings with no throttling and millisecond back-off.
pub fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryConfig::default()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(100))
            .with_min_spacing(Duration::ZERO),
        circuit_breaker: CircuitBreakerConfig::default()
            .with_failure_threshold(5)
            .with_window(Duration::from_secs(60))
            .with_cooldown(Duration::from_secs(60)),
        run: RunConfig::default().with_batch_size(100).with_max_pages(20),
    }
}
