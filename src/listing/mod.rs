//! Article listing pagination
//!
//! The home page shows the first page of article summaries and a "load
//! more" affordance bound to the continuation cursor. Loading more appends
//! the next page to a [`ListingState`] and replaces the stored cursor.
//! The state is an explicit value: it is passed into [`Paginator::load_more`]
//! and handed back, never kept behind the caller's back.

use std::sync::Arc;
use thiserror::Error;

use crate::cms::{CmsError, ContentSource, Cursor, Ordering, Query, ReleaseRef, SearchResponse};
use crate::content::ArticleSummary;

/// One page of summaries plus the cursor to the next one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub articles: Vec<ArticleSummary>,
    /// `None` exactly when no further results exist
    pub next_page: Option<Cursor>,
}

impl ListingPage {
    /// Convert a search response, skipping documents that cannot be listed
    pub fn from_response(response: SearchResponse) -> Self {
        let articles = response
            .results
            .into_iter()
            .filter_map(|doc| match ArticleSummary::try_from(doc) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    tracing::warn!("Skipping listing entry: {}", e);
                    None
                }
            })
            .collect();

        Self {
            articles,
            next_page: response.next_page.map(Cursor::new),
        }
    }
}

#[derive(Error, Debug)]
pub enum ListingError {
    #[error("No more results to load")]
    Exhausted,

    #[error("A load is already in flight")]
    InFlight,

    #[error(transparent)]
    Fetch(#[from] CmsError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    /// The last load failed; the listing is intact and may be retried
    Failed(String),
}

/// Accumulated listing: every article loaded so far and the current cursor
#[derive(Debug, Clone, PartialEq)]
pub struct ListingState {
    articles: Vec<ArticleSummary>,
    cursor: Option<Cursor>,
    status: LoadStatus,
}

impl ListingState {
    pub fn new(page: ListingPage) -> Self {
        Self {
            articles: page.articles,
            cursor: page.next_page,
            status: LoadStatus::Idle,
        }
    }

    pub fn articles(&self) -> &[ArticleSummary] {
        &self.articles
    }

    pub fn into_articles(self) -> Vec<ArticleSummary> {
        self.articles
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    /// Whether a "load more" affordance should be offered
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }

    /// Mark a load as started and hand out the cursor to fetch.
    ///
    /// Only one load may be in flight at a time.
    pub fn begin_load(&mut self) -> Result<Cursor, ListingError> {
        if self.status == LoadStatus::Loading {
            return Err(ListingError::InFlight);
        }
        let cursor = self.cursor.clone().ok_or(ListingError::Exhausted)?;
        self.status = LoadStatus::Loading;
        Ok(cursor)
    }

    /// Append a fetched page and replace the cursor
    pub fn finish_load(&mut self, page: ListingPage) {
        self.articles.extend(page.articles);
        self.cursor = page.next_page;
        self.status = LoadStatus::Idle;
    }

    /// Record a failed load; articles and cursor are left untouched
    pub fn fail_load(&mut self, error: &CmsError) {
        self.status = LoadStatus::Failed(error.to_string());
    }
}

/// Fetches listing pages of one document type
#[derive(Clone)]
pub struct Paginator {
    source: Arc<dyn ContentSource>,
    document_type: String,
    release: Option<ReleaseRef>,
}

impl Paginator {
    pub fn new(
        source: Arc<dyn ContentSource>,
        document_type: impl Into<String>,
        release: Option<ReleaseRef>,
    ) -> Self {
        Self {
            source,
            document_type: document_type.into(),
            release,
        }
    }

    /// First page of the listing
    pub async fn fetch_initial_listing(
        &self,
        page_size: usize,
        ordering: Ordering,
    ) -> Result<ListingPage, CmsError> {
        let query = Query::new(&self.document_type)
            .page_size(page_size)
            .order_by(ordering)
            .release(self.release.clone());
        let response = self.source.query(&query).await?;
        let page = ListingPage::from_response(response);
        tracing::debug!(
            "Fetched initial listing: {} articles, more: {}",
            page.articles.len(),
            page.next_page.is_some()
        );
        Ok(page)
    }

    /// The page a cursor points to
    pub async fn fetch_next_listing(&self, cursor: &Cursor) -> Result<ListingPage, CmsError> {
        let response = self.source.fetch_page(cursor).await?;
        Ok(ListingPage::from_response(response))
    }

    /// Load the next page into `state`.
    ///
    /// Failures are recorded in the returned state's status instead of
    /// discarding what was already loaded.
    pub async fn load_more(&self, mut state: ListingState) -> ListingState {
        let cursor = match state.begin_load() {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::debug!("Not loading more: {}", e);
                return state;
            }
        };

        match self.fetch_next_listing(&cursor).await {
            Ok(page) => state.finish_load(page),
            Err(e) => {
                tracing::warn!("Failed to load more articles: {}", e);
                state.fail_load(&e);
            }
        }
        state
    }

    /// Follow the cursor chain from `initial` to the end, returning every page
    pub async fn collect_pages(&self, initial: ListingPage) -> Result<Vec<ListingPage>, ListingError> {
        let mut state = ListingState::new(initial.clone());
        let mut pages = vec![initial];

        while state.has_more() {
            let cursor = state.begin_load()?;
            match self.fetch_next_listing(&cursor).await {
                Ok(page) => {
                    pages.push(page.clone());
                    state.finish_load(page);
                }
                Err(e) => {
                    state.fail_load(&e);
                    return Err(e.into());
                }
            }
        }

        tracing::debug!(
            "Collected {} listing pages ({} articles)",
            pages.len(),
            state.articles().len()
        );
        Ok(pages)
    }
}
