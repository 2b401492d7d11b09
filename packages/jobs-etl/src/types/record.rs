//! Loosely-typed records as they come off the wire.
//!
//! Only [`RecordValidator`](crate::validator::RecordValidator) looks inside a
//! [`RawRecord`]; everything downstream uses
//! [`JobPosting`](crate::types::posting::JobPosting).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One raw job record from a result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source field names mapped to JSON values
    pub fields: Map<String, Value>,

    /// When the page carrying this record was fetched
    pub fetched_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(fields: Map<String, Value>, fetched_at: DateTime<Utc>) -> Self {
        Self { fields, fetched_at }
    }

    /// Build from any JSON value; non-objects yield an empty record.
    pub fn from_value(value: Value, fetched_at: DateTime<Utc>) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(fields, fetched_at)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field (builder pattern).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Remove a field (builder pattern).
    pub fn without_field(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// 1-based page number
    pub page: u32,

    /// Records on this page
    pub records: Vec<RawRecord>,

    /// Total matches reported by the upstream, if it reports one
    pub total_results: Option<u64>,
}

impl SearchPage {
    pub fn new(page: u32, records: Vec<RawRecord>) -> Self {
        Self {
            page,
            records,
            total_results: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total_results = Some(total);
        self
    }

    /// Number of records this page reported.
    pub fn result_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
