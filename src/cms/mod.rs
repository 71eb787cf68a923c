//! Content service access
//!
//! Everything the site knows about its articles comes through a
//! [`ContentSource`]: the remote [`PrismicClient`] in production, or a
//! [`MemorySource`] loaded from a JSON dump for offline builds and tests.

mod client;
mod document;
mod error;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use client::PrismicClient;
pub use document::{ApiInfo, ApiRef, Document, SearchResponse};
pub(crate) use document::null_as_default;
pub use error::{CmsError, Result};
pub use memory::MemorySource;

use crate::config::CmsConfig;

/// Field holding a document's first publication date
pub const FIRST_PUBLICATION_DATE: &str = "document.first_publication_date";

/// Preview capability: a release ref that exposes unpublished content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseRef(String);

impl ReleaseRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque continuation token for the next page of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(cursor: impl Into<String>) -> Self {
        Self(cursor.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering clause: a field and a direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordering {
    pub field: String,
    pub direction: Direction,
}

impl Ordering {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Most recent first
    pub fn newest_first() -> Self {
        Self::new(FIRST_PUBLICATION_DATE, Direction::Desc)
    }

    /// Oldest first
    pub fn oldest_first() -> Self {
        Self::new(FIRST_PUBLICATION_DATE, Direction::Asc)
    }

    /// Query-language form, e.g. `document.first_publication_date desc`
    pub fn clause(&self) -> String {
        match self.direction {
            Direction::Asc => self.field.clone(),
            Direction::Desc => format!("{} desc", self.field),
        }
    }
}

/// A query for documents of one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub document_type: String,
    pub page_size: usize,
    /// 1-based page number
    pub page: usize,
    pub orderings: Vec<Ordering>,
    /// Only return documents positioned after this document id
    pub after: Option<String>,
    pub release: Option<ReleaseRef>,
}

impl Query {
    /// Default page size of the search endpoint
    pub const DEFAULT_PAGE_SIZE: usize = 20;

    pub fn new(document_type: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            page: 1,
            orderings: Vec::new(),
            after: None,
            release: None,
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.orderings.push(ordering);
        self
    }

    pub fn after(mut self, document_id: impl Into<String>) -> Self {
        self.after = Some(document_id.into());
        self
    }

    pub fn release(mut self, release: Option<ReleaseRef>) -> Self {
        self.release = release;
        self
    }

    /// Predicate selecting the document type
    pub fn predicate(&self) -> String {
        format!("[[at(document.type, \"{}\")]]", self.document_type)
    }

    /// Bracketed orderings parameter, `None` when unordered
    pub fn orderings_param(&self) -> Option<String> {
        if self.orderings.is_empty() {
            return None;
        }
        let clauses: Vec<String> = self.orderings.iter().map(Ordering::clause).collect();
        Some(format!("[{}]", clauses.join(",")))
    }
}

/// A hosted document store the site reads articles from
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Run a query and return its first requested page
    async fn query(&self, query: &Query) -> Result<SearchResponse>;

    /// Follow a continuation cursor returned by a previous response
    async fn fetch_page(&self, cursor: &Cursor) -> Result<SearchResponse>;

    /// Fetch one document by its uid
    async fn get_by_uid(
        &self,
        document_type: &str,
        uid: &str,
        release: Option<&ReleaseRef>,
    ) -> Result<Document>;
}

/// Build the content source described by the configuration
pub fn from_config(config: &CmsConfig, base_dir: &Path) -> anyhow::Result<Arc<dyn ContentSource>> {
    if let Some(fixtures) = &config.fixtures {
        let path = if fixtures.is_absolute() {
            fixtures.clone()
        } else {
            base_dir.join(fixtures)
        };
        tracing::info!("Serving content from fixtures {:?}", path);
        return Ok(Arc::new(MemorySource::from_file(&path)?));
    }

    if config.endpoint.trim().is_empty() {
        anyhow::bail!("cms.endpoint is not configured (or set cms.fixtures for offline builds)");
    }

    tracing::debug!("Using content API at {}", config.endpoint);
    Ok(Arc::new(PrismicClient::new(config)?))
}
