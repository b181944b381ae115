//! Search API and bounded pagination.
//!
//! InsightAppSec exposes one `POST /search` endpoint that is typed by the
//! request body (`APP`, `SCAN`, `VULNERABILITY`) and paged by `index`/`size`
//! query parameters. Every page carries the server's `total_data` count.
//!
//! [`Paginator`] wraps any page-fetching closure in a lazy cursor. It stops on
//! whichever comes first: the accumulated item count reaching `total_data`, a
//! page with no items, or the `max_pages` safety bound. A server that reports
//! a wrong total therefore cannot drive it into an endless loop.

use crate::{InsightAppSecClient, InsightAppSecError};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::marker::PhantomData;

/// Items requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Hard upper bound on pages fetched by one cursor.
pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// Entity type searched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchType {
    App,
    Scan,
    Vulnerability,
}

/// Body of a search request, plus the optional sort query parameter.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    #[serde(rename = "type")]
    pub search_type: SearchType,
    pub query: String,
    /// Sent as the `sort` query parameter, e.g. `scan.submit_time,DESC`
    #[serde(skip)]
    pub sort: Option<String>,
}

impl SearchRequest {
    #[must_use]
    pub fn new(search_type: SearchType, query: impl Into<String>) -> Self {
        Self {
            search_type,
            query: query.into(),
            sort: None,
        }
    }

    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }
}

/// Position of a single page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page index, starting at 0
    pub index: u32,
    /// Items per page
    pub size: u32,
}

/// Pagination information returned with every page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageMetadata {
    pub index: u32,
    pub size: u32,
    pub total_data: u64,
    pub total_pages: u32,
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub metadata: PageMetadata,
}

/// Lazy, restartable cursor over a paged endpoint.
pub struct Paginator<T, F> {
    fetch: F,
    page_size: u32,
    max_pages: u32,
    next_index: u32,
    accumulated: u64,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F, Fut> Paginator<T, F>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<SearchPage<T>, InsightAppSecError>>,
{
    /// Create a cursor that calls `fetch` once per page.
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            next_index: 0,
            accumulated: 0,
            finished: false,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Number of pages requested since creation or the last restart.
    #[must_use]
    pub fn pages_fetched(&self) -> u32 {
        self.next_index
    }

    /// Rewind to page 0 so the sequence can be consumed again.
    pub fn restart(&mut self) {
        self.next_index = 0;
        self.accumulated = 0;
        self.finished = false;
    }

    /// Fetch the next page, or `None` once the sequence is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the page fetch error; the cursor is then finished until restarted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, InsightAppSecError> {
        if self.finished {
            return Ok(None);
        }

        if self.next_index >= self.max_pages {
            warn!(
                "Reached maximum page limit ({}) after {} items; stopping pagination",
                self.max_pages, self.accumulated
            );
            self.finished = true;
            return Ok(None);
        }

        let request = PageRequest {
            index: self.next_index,
            size: self.page_size,
        };

        let page = match (self.fetch)(request).await {
            Ok(page) => page,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };

        self.next_index = self.next_index.saturating_add(1);
        let count = page.data.len();
        self.accumulated = self.accumulated.saturating_add(count as u64);

        debug!(
            "Page {} returned {} items ({} of {} reported)",
            request.index, count, self.accumulated, page.metadata.total_data
        );

        if count == 0 {
            self.finished = true;
            return Ok(None);
        }
        if self.accumulated >= page.metadata.total_data {
            self.finished = true;
        }

        Ok(Some(page.data))
    }

    /// Drain every remaining page into one vector.
    ///
    /// # Errors
    ///
    /// Any page error fails the whole collection; items gathered so far are dropped.
    pub async fn collect_all(mut self) -> Result<Vec<T>, InsightAppSecError> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }
}

impl InsightAppSecClient {
    /// Request a single page from the search endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the page cannot be parsed.
    pub async fn search_page<T: DeserializeOwned>(
        &self,
        request: &SearchRequest,
        page: PageRequest,
    ) -> Result<SearchPage<T>, InsightAppSecError> {
        let index = page.index.to_string();
        let size = page.size.to_string();
        let mut params = vec![("index", index.as_str()), ("size", size.as_str())];
        if let Some(sort) = &request.sort {
            params.push(("sort", sort.as_str()));
        }

        self.post_json("/search", &params, request).await
    }

    /// Run a search and collect every page.
    ///
    /// # Errors
    ///
    /// Returns the first page error encountered.
    pub async fn search_all<T: DeserializeOwned>(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<T>, InsightAppSecError> {
        debug!(
            "Searching {:?} with query: {}",
            request.search_type, request.query
        );
        let results = Paginator::new(move |page| self.search_page::<T>(request, page))
            .with_page_size(DEFAULT_PAGE_SIZE)
            .collect_all()
            .await?;
        debug!("Search returned {} {:?} records", results.len(), request.search_type);
        Ok(results)
    }
}
