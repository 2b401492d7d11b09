//! Scripted search source for tests and dry runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::traits::source::SearchSource;
use crate::types::{
    query::SearchQuery,
    record::{RawRecord, SearchPage},
};

/// A search source that replays a script of pages and failures.
///
/// Each call to `fetch_page` consumes the next scripted response, whatever
/// page number is requested. Once the script is exhausted every call returns
/// an empty page. Clones share the script and the call log.
#[derive(Clone, Default)]
pub struct MockSource {
    /// Responses in call order
    script: Arc<RwLock<VecDeque<ApiResult<Vec<RawRecord>>>>>,

    /// Call tracking
    calls: Arc<RwLock<Vec<MockSourceCall>>>,

    /// Simulated request latency
    latency: Option<Duration>,

    max_page_size: Option<u32>,

    /// Total reported on every page
    total: Option<u64>,
}

/// Record of a call made to the mock source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSourceCall {
    pub keyword: String,
    pub page: u32,
    pub results_per_page: u32,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful page.
    pub fn with_page(self, records: Vec<RawRecord>) -> Self {
        self.push(Ok(records));
        self
    }

    /// Queue several successful pages.
    pub fn with_pages(self, pages: impl IntoIterator<Item = Vec<RawRecord>>) -> Self {
        for records in pages {
            self.push(Ok(records));
        }
        self
    }

    /// Queue a failed call.
    pub fn with_failure(self, error: ApiError) -> Self {
        self.push(Err(error));
        self
    }

    /// Sleep this long (on the tokio clock) before answering each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_max_page_size(mut self, max: u32) -> Self {
        self.max_page_size = Some(max);
        self
    }

    /// Report `total` matches on every page.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockSourceCall> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn push(&self, response: ApiResult<Vec<RawRecord>>) {
        self.script
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    fn next_response(&self) -> ApiResult<Vec<RawRecord>> {
        self.script
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl SearchSource for MockSource {
    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> ApiResult<SearchPage> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockSourceCall {
                keyword: query.keyword.clone(),
                page,
                results_per_page: query.results_per_page,
            });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let fetched_at = Utc::now();
        let records = self
            .next_response()?
            .into_iter()
            .map(|record| RawRecord::new(record.fields, fetched_at))
            .collect();
        let search_page = SearchPage::new(page, records);
        Ok(match self.total {
            Some(total) => search_page.with_total(total),
            None => search_page,
        })
    }

    fn max_page_size(&self) -> Option<u32> {
        self.max_page_size
    }
}
