//! USAJOBS search API client.
//!
//! One call to [`UsaJobsSource::fetch_page`] is exactly one HTTP request.
//! Non-success statuses are classified into [`ApiError`] variants so the
//! retry policy can tell transient from permanent failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{RETRY_AFTER, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::{ApiError, ApiResult};
use crate::traits::source::SearchSource;
use crate::types::{
    query::SearchQuery,
    record::{RawRecord, SearchPage},
};

pub const DEFAULT_BASE_URL: &str = "https://data.usajobs.gov/api/search";
pub const DEFAULT_USER_AGENT: &str = "jobs-etl/0.1";

/// Page size cap enforced by the API.
pub const MAX_RESULTS_PER_PAGE: u32 = 500;

/// Error bodies are truncated to this many characters in messages.
const MAX_ERROR_BODY: usize = 512;

/// Client for the USAJOBS search endpoint.
pub struct UsaJobsSource {
    client: reqwest::Client,
    config: SourceConfig,
}

impl UsaJobsSource {
    pub fn new(config: SourceConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn query_params(query: &SearchQuery, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("Keyword", query.keyword.clone()),
            (
                "ResultsPerPage",
                query.results_per_page.min(MAX_RESULTS_PER_PAGE).to_string(),
            ),
            ("Page", page.to_string()),
            ("WhoMayApply", "All".to_string()),
        ];
        if let Some(location) = &query.location {
            params.push(("LocationName", location.clone()));
        }
        params
    }
}

#[async_trait]
impl SearchSource for UsaJobsSource {
    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> ApiResult<SearchPage> {
        debug!(page, keyword = %query.keyword, "Requesting search page");

        let resp = self
            .client
            .get(&self.config.base_url)
            .header(USER_AGENT, &self.config.user_agent)
            .header("Authorization-Key", self.config.api_key.expose())
            .query(&Self::query_params(query, page))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            let message: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(ApiError::from_status(status.as_u16(), message, retry_after));
        }

        let body = resp.bytes().await?;
        let search_page = parse_search_response(&body, page, Utc::now())?;

        info!(
            page,
            items = search_page.result_count(),
            total = ?search_page.total_results,
            "Fetched search page"
        );
        Ok(search_page)
    }

    fn max_page_size(&self) -> Option<u32> {
        Some(MAX_RESULTS_PER_PAGE)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    search_result: Option<SearchResultBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResultBody {
    #[serde(default)]
    search_result_count_all: Option<u64>,
    #[serde(default)]
    search_result_items: Vec<SearchResultItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResultItem {
    #[serde(default)]
    matched_object_descriptor: Value,
}

/// Decode a search response body into a page of raw records.
///
/// Each record is the item's `MatchedObjectDescriptor`; field-level checks are
/// left to the validator.
pub fn parse_search_response(
    body: &[u8],
    page: u32,
    fetched_at: DateTime<Utc>,
) -> ApiResult<SearchPage> {
    let response: SearchResponse =
        serde_json::from_slice(body).map_err(|e| ApiError::Schema(e.to_string()))?;

    let result = response
        .search_result
        .ok_or_else(|| ApiError::Schema("response has no SearchResult".to_string()))?;

    let records = result
        .search_result_items
        .into_iter()
        .map(|item| RawRecord::from_value(item.matched_object_descriptor, fetched_at))
        .collect();

    let mut search_page = SearchPage::new(page, records);
    if let Some(total) = result.search_result_count_all {
        search_page = search_page.with_total(total);
    }
    Ok(search_page)
}
