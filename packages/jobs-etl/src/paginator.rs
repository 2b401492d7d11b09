//! Lazy, strictly sequential page sequence over a search source.

use async_stream::stream;
use futures::Stream;
use std::pin::Pin;
use tracing::{debug, error, info};

use crate::error::ApiResult;
use crate::resilience::RetryPolicy;
use crate::traits::source::SearchSource;
use crate::types::{query::SearchQuery, record::SearchPage};

/// Stream of fetched pages; an `Err` item is always the last one.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = ApiResult<SearchPage>> + Send + 'a>>;

/// Drives a [`RetryPolicy`] across successive result pages.
///
/// Pagination stops after a page with fewer records than the page size
/// (yielded), once the records seen cover the total the upstream reports
/// (yielded), at an empty page (not yielded), after `max_pages` pages, or at
/// the first page whose retries are exhausted (yielded as `Err`).
pub struct ApiPaginator<S> {
    source: S,
    retry: RetryPolicy,
    max_pages: u32,
}

impl<S: SearchSource> ApiPaginator<S> {
    pub fn new(source: S, retry: RetryPolicy, max_pages: u32) -> Self {
        Self {
            source,
            retry,
            max_pages,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Page size actually requested: the query's, capped by the source.
    pub fn effective_page_size(&self, query: &SearchQuery) -> u32 {
        let requested = query.results_per_page;
        self.source
            .max_page_size()
            .map_or(requested, |max| requested.min(max))
            .max(1)
    }

    /// Lazily fetch pages for `query`, one request at a time.
    ///
    /// Nothing is fetched until the stream is polled. Calling `pages` again
    /// starts over from page 1.
    pub fn pages<'a>(&'a self, query: &SearchQuery) -> PageStream<'a> {
        let page_size = self.effective_page_size(query);
        let query = query.clone().with_page_size(page_size);
        let source = &self.source;
        let retry = &self.retry;
        let max_pages = self.max_pages;

        Box::pin(stream! {
            let query = &query;

            let mut seen: u64 = 0;

            for page in 1..=max_pages {
                let fetched = retry
                    .execute(move || source.fetch_page(query, page))
                    .await;

                let search_page = match fetched {
                    Ok(p) => p,
                    Err(e) => {
                        error!(page, error = %e, "Page fetch failed, stopping pagination");
                        yield Err(e);
                        return;
                    }
                };

                let count = search_page.result_count();
                if count == 0 {
                    debug!(page, "Empty page, pagination complete");
                    return;
                }

                seen += count as u64;
                let is_short = count < page_size as usize;
                let total = search_page.total_results;
                yield Ok(search_page);

                if is_short {
                    debug!(page, count, page_size, "Short page, pagination complete");
                    return;
                }
                if let Some(total) = total.filter(|&total| seen >= total) {
                    debug!(page, seen, total, "Reported total reached, pagination complete");
                    return;
                }
            }

            info!(max_pages, "Reached page limit, stopping pagination");
        })
    }
}
