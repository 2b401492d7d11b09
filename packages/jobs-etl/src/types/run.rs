//! Run-level bookkeeping.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EtlError;
use crate::types::posting::BatchReport;
use crate::types::query::SearchQuery;

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Still in progress (never persisted)
    Running,
    /// Completed with no rejections or write failures
    Success,
    /// Completed with per-record problems, or aborted after writing something
    Partial,
    /// Aborted before writing anything, or timed out
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Audit record for one run.
///
/// Counters only grow while the run is active. Once [`finalized`](Self::is_finalized)
/// the record is frozen: later calls to the mutators are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub keyword: String,
    pub location: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_fetched: u32,
    pub records_seen: u64,
    pub records_persisted: u64,
    pub records_inserted: u64,
    pub records_updated: u64,
    pub records_rejected: u64,
    pub records_failed: u64,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

impl RunMetadata {
    /// Open a new run for `query`.
    pub fn start(query: &SearchQuery) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            keyword: query.keyword.clone(),
            location: query.location.clone(),
            started_at: Utc::now(),
            finished_at: None,
            pages_fetched: 0,
            records_seen: 0,
            records_persisted: 0,
            records_inserted: 0,
            records_updated: 0,
            records_rejected: 0,
            records_failed: 0,
            status: RunStatus::Running,
            error_message: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn record_page(&mut self, records: usize) {
        if self.is_finalized() {
            return;
        }
        self.pages_fetched += 1;
        self.records_seen += records as u64;
    }

    pub fn record_rejection(&mut self) {
        if self.is_finalized() {
            return;
        }
        self.records_rejected += 1;
    }

    pub fn record_batch(&mut self, report: &BatchReport) {
        if self.is_finalized() {
            return;
        }
        self.records_inserted += report.inserted as u64;
        self.records_updated += report.updated as u64;
        self.records_persisted += report.persisted() as u64;
        self.records_failed += report.failures.len() as u64;
    }

    /// Finalize a run that reached the end of pagination.
    pub fn complete(&mut self) {
        if self.is_finalized() {
            return;
        }
        if self.records_rejected == 0 && self.records_failed == 0 {
            self.status = RunStatus::Success;
        } else {
            self.status = RunStatus::Partial;
            self.error_message = Some(format!(
                "{} records rejected by validation, {} records failed to persist",
                self.records_rejected, self.records_failed
            ));
        }
        self.finished_at = Some(Utc::now());
    }

    /// Finalize a run aborted by a run-fatal error.
    pub fn fail(&mut self, error: &EtlError) {
        if self.is_finalized() {
            return;
        }
        self.status = match error {
            EtlError::Timeout { .. } => RunStatus::Failed,
            _ if self.records_persisted > 0 => RunStatus::Partial,
            _ => RunStatus::Failed,
        };
        self.error_message = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }
}
