//! Search query handed to the paginator.

use serde::{Deserialize, Serialize};

/// Default page size requested from the search API.
pub const DEFAULT_RESULTS_PER_PAGE: u32 = 500;

/// Keyword/location query plus the page size to request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text keyword (e.g. "data engineering")
    pub keyword: String,

    /// Optional location filter
    pub location: Option<String>,

    /// Requested page size
    pub results_per_page: u32,
}

impl SearchQuery {
    /// Create a query with the default page size and no location.
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            location: None,
            results_per_page: DEFAULT_RESULTS_PER_PAGE,
        }
    }

    /// Restrict the query to a location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the requested page size (at least one).
    pub fn with_page_size(mut self, results_per_page: u32) -> Self {
        self.results_per_page = results_per_page.max(1);
        self
    }
}
