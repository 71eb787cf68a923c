//! Previous/next article resolution
//!
//! The previous article is the first one after the current article when
//! ordered newest first, the next article the first one after it when
//! ordered oldest first. Neighbor links are best-effort: any failure
//! leaves that direction empty and never fails the page.

use serde::Serialize;
use std::sync::Arc;

use crate::cms::{CmsError, ContentSource, Ordering, Query, ReleaseRef};
use crate::content::{AdjacentLink, ArticleSummary};

/// Chronological neighbors of an article
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Neighbors {
    /// Older article
    pub previous: Option<AdjacentLink>,
    /// Newer article
    pub next: Option<AdjacentLink>,
}

/// Looks up neighbors through the content source
#[derive(Clone)]
pub struct AdjacentResolver {
    source: Arc<dyn ContentSource>,
    document_type: String,
    release: Option<ReleaseRef>,
}

impl AdjacentResolver {
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

    /// Resolve both neighbors of `current` concurrently.
    ///
    /// Unpublished drafts have no place in the timeline and get none.
    pub async fn resolve_neighbors(&self, current: &ArticleSummary) -> Neighbors {
        if current.first_publication_date.is_none() {
            tracing::debug!("{} is unpublished, skipping neighbors", current.uid);
            return Neighbors::default();
        }

        let (previous, next) = futures::join!(
            self.neighbor(current, Ordering::newest_first()),
            self.neighbor(current, Ordering::oldest_first()),
        );

        Neighbors { previous, next }
    }

    async fn neighbor(&self, current: &ArticleSummary, ordering: Ordering) -> Option<AdjacentLink> {
        match self.query_neighbor(current, &ordering).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(
                    "Could not resolve neighbor of {} ({}): {}",
                    current.uid,
                    ordering.clause(),
                    e
                );
                None
            }
        }
    }

    async fn query_neighbor(
        &self,
        current: &ArticleSummary,
        ordering: &Ordering,
    ) -> Result<Option<AdjacentLink>, CmsError> {
        let query = Query::new(&self.document_type)
            .page_size(1)
            .order_by(ordering.clone())
            .after(&current.id)
            .release(self.release.clone());

        let response = self.source.query(&query).await?;
        let Some(doc) = response.results.into_iter().next() else {
            return Ok(None);
        };

        // The anchor itself comes back when there is no real neighbor
        if doc.id == current.id || doc.uid.as_deref() == Some(current.uid.as_str()) {
            return Ok(None);
        }

        AdjacentLink::try_from(doc).map(Some)
    }
}
