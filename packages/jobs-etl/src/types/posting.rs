//! Canonical job posting and the bookkeeping returned by stores.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::PersistenceError;

/// A validated, normalized job posting.
///
/// `position_uri` is the natural key: re-extracting the same URI updates the
/// existing row instead of adding a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct JobPosting {
    pub position_title: String,
    pub position_uri: String,
    pub position_location: Option<String>,
    pub position_remuneration: Option<String>,
    pub position_start_date: Option<NaiveDate>,
    pub position_end_date: Option<NaiveDate>,
    pub organization_name: Option<String>,
    pub department_name: Option<String>,
    pub job_category: Option<String>,
    pub job_grade: Option<String>,

    /// When the record was extracted from the upstream
    pub extracted_at: DateTime<Utc>,
}

impl JobPosting {
    /// Create a posting with only the required fields set.
    pub fn new(
        position_title: impl Into<String>,
        position_uri: impl Into<String>,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            position_title: position_title.into(),
            position_uri: position_uri.into(),
            position_location: None,
            position_remuneration: None,
            position_start_date: None,
            position_end_date: None,
            organization_name: None,
            department_name: None,
            job_category: None,
            job_grade: None,
            extracted_at,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.position_location = Some(location.into());
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization_name = Some(organization.into());
        self
    }

    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.position_start_date = start;
        self.position_end_date = end;
        self
    }

    /// Copy every mutable field from `other` (key and `extracted_at` stay).
    pub fn merge_mutable_fields(&mut self, other: &JobPosting) {
        self.position_title = other.position_title.clone();
        self.position_location = other.position_location.clone();
        self.position_remuneration = other.position_remuneration.clone();
        self.position_start_date = other.position_start_date;
        self.position_end_date = other.position_end_date;
        self.organization_name = other.organization_name.clone();
        self.department_name = other.department_name.clone();
        self.job_category = other.job_category.clone();
        self.job_grade = other.job_grade.clone();
    }
}

/// A posting as persisted, with storage bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredPosting {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub posting: JobPosting,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a single upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Result of a batch upsert: counts plus per-record failures.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
    pub failures: Vec<PersistenceError>,
}

impl BatchReport {
    /// Records written (inserted or updated).
    pub fn persisted(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }
}

/// Aggregate figures over the postings table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PostingStats {
    pub total_postings: i64,
    pub unique_organizations: i64,
    pub postings_today: i64,
    pub postings_this_week: i64,
    pub first_created_at: Option<DateTime<Utc>>,
    pub last_created_at: Option<DateTime<Utc>>,
}
