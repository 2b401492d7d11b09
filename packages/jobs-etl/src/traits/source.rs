//! Search source trait.

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::types::{query::SearchQuery, record::SearchPage};

/// A paginated job search endpoint.
///
/// Implementations make exactly one request per call; retries, throttling
/// and circuit breaking are layered on top by the paginator.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Fetch one 1-based page of results for `query`.
    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> ApiResult<SearchPage>;

    /// Largest page size the endpoint honours, if it caps it.
    fn max_page_size(&self) -> Option<u32> {
        None
    }
}
