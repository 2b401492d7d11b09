//! Raw record → canonical [`JobPosting`].
//!
//! The only place that knows the upstream field names. Required fields are
//! the title and the URI (the natural key); everything else is optional and a
//! malformed optional field is dropped, never fatal to the record.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ValidationError;
use crate::types::{posting::JobPosting, record::RawRecord};

/// Validates and normalizes raw search records. Pure: no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl RecordValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, raw: &RawRecord) -> Result<JobPosting, ValidationError> {
        let position_title = text(raw.get("PositionTitle")).ok_or(ValidationError::MissingField {
            field: "position_title",
        })?;
        let position_uri = text(raw.get("PositionURI")).ok_or(ValidationError::MissingField {
            field: "position_uri",
        })?;
        if !is_http_url(&position_uri) {
            return Err(ValidationError::InvalidUri { uri: position_uri });
        }

        let mut start = date_field(raw, "PositionStartDate", &position_uri);
        let mut end = date_field(raw, "PositionEndDate", &position_uri);
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                warn!(
                    uri = %position_uri,
                    start = %s,
                    end = %e,
                    "Start date after end date, dropping both"
                );
                start = None;
                end = None;
            }
        }

        let mut posting = JobPosting::new(position_title, position_uri, raw.fetched_at)
            .with_dates(start, end);
        posting.position_location = location(raw.get("PositionLocation"));
        posting.position_remuneration = remuneration(raw.get("PositionRemuneration"));
        posting.organization_name = text(raw.get("OrganizationName"));
        posting.department_name = text(raw.get("DepartmentName"));
        posting.job_category =
            first_entry(raw.get("JobCategory")).and_then(|c| text(c.get("Name")));
        posting.job_grade = first_entry(raw.get("JobGrade")).and_then(|g| text(g.get("Code")));

        Ok(posting)
    }
}

/// Trimmed, non-empty text; numbers are rendered as text.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_http_url(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    ["http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

/// First object of a JSON array field.
fn first_entry(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value?.as_array()?.first()?.as_object()
}

/// "City, State, Country" from the first location entry.
fn location(value: Option<&Value>) -> Option<String> {
    let entry = first_entry(value)?;
    let country = match entry.get("CountryCode") {
        None => Some("US".to_string()),
        present => text(present),
    };
    let parts: Vec<String> = [text(entry.get("CityName")), text(entry.get("StateCode")), country]
        .into_iter()
        .flatten()
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// "$80,000 - $120,000 Per Year" or "$80,000+ Per Year".
fn remuneration(value: Option<&Value>) -> Option<String> {
    let entry = first_entry(value)?;
    let min = amount(entry.get("MinimumRange"))?;
    let max = amount(entry.get("MaximumRange")).filter(|max| *max > 0);
    let interval = text(entry.get("RateIntervalCode")).unwrap_or_default();

    let range = match max {
        Some(max) => format!("${} - ${}", group_thousands(min), group_thousands(max)),
        None => format!("${}+", group_thousands(min)),
    };
    Some(format!("{range} {interval}").trim_end().to_string())
}

/// Whole currency units; fractional parts are truncated.
fn amount(value: Option<&Value>) -> Option<i64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n > 0.0).then(|| n.trunc() as i64)
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

/// What a raw date value amounts to.
#[derive(Debug, PartialEq, Eq)]
enum DateValue {
    Absent,
    Date(NaiveDate),
    Unparseable,
}

fn date_value(value: Option<&Value>) -> DateValue {
    match value {
        None | Some(Value::Null) => DateValue::Absent,
        Some(Value::String(s)) if s.trim().is_empty() => DateValue::Absent,
        Some(Value::String(s)) => {
            parse_date(s.trim()).map_or(DateValue::Unparseable, DateValue::Date)
        }
        Some(_) => DateValue::Unparseable,
    }
}

fn date_field(raw: &RawRecord, key: &str, uri: &str) -> Option<NaiveDate> {
    match date_value(raw.get(key)) {
        DateValue::Date(date) => Some(date),
        DateValue::Absent => None,
        DateValue::Unparseable => {
            warn!(
                uri,
                field = key,
                value = ?raw.get(key),
                "Unparseable date, treating as absent"
            );
            None
        }
    }
}

/// Calendar date from an ISO-8601 datetime (offset or naive) or a plain date.
fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
