//! In-memory content source backed by a JSON dump of documents

use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::{
    CmsError, ContentSource, Cursor, Direction, Document, Ordering, Query, ReleaseRef, Result,
    SearchResponse,
};

const CURSOR_SCHEME: &str = "memory:";

/// Fixture file layout; a bare array of documents is accepted too
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixtureFile {
    documents: Vec<Document>,
    /// Release ref -> documents added or changed by that release
    releases: HashMap<String, Vec<Document>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Fixtures {
    Bare(Vec<Document>),
    Full(FixtureFile),
}

/// Content source serving documents held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: Vec<Document>,
    releases: HashMap<String, Vec<Document>>,
}

impl MemorySource {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            releases: HashMap::new(),
        }
    }

    /// Load documents from a fixture file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let source = match serde_json::from_str::<Fixtures>(&content)? {
            Fixtures::Bare(documents) => Self::new(documents),
            Fixtures::Full(file) => Self {
                documents: file.documents,
                releases: file.releases,
            },
        };
        tracing::debug!(
            "Loaded {} documents and {} releases from {:?}",
            source.documents.len(),
            source.releases.len(),
            path
        );
        Ok(source)
    }

    /// Register a preview release overlaying the published documents
    pub fn with_release(mut self, release: &ReleaseRef, documents: Vec<Document>) -> Self {
        self.releases.insert(release.as_str().to_string(), documents);
        self
    }

    /// Documents visible under `release`, release versions replacing published ones
    fn visible(&self, release: Option<&ReleaseRef>) -> Result<Vec<Document>> {
        let Some(release) = release else {
            return Ok(self.documents.clone());
        };
        let overlay = self
            .releases
            .get(release.as_str())
            .ok_or_else(|| CmsError::UnknownRef(release.to_string()))?;

        let mut documents = self.documents.clone();
        for doc in overlay {
            match documents.iter_mut().find(|d| d.id == doc.id) {
                Some(existing) => *existing = doc.clone(),
                None => documents.push(doc.clone()),
            }
        }
        Ok(documents)
    }

    fn run(&self, query: &Query) -> Result<SearchResponse> {
        let mut matching: Vec<Document> = self
            .visible(query.release.as_ref())?
            .into_iter()
            .filter(|d| d.doc_type == query.document_type)
            .collect();

        matching.sort_by(|a, b| compare(a, b, &query.orderings));

        if let Some(anchor) = &query.after {
            matching = match matching.iter().position(|d| &d.id == anchor) {
                Some(pos) => matching.split_off(pos + 1),
                None => Vec::new(),
            };
        }

        let page_size = query.page_size.max(1);
        let page = query.page.max(1);
        let total = matching.len();
        let total_pages = total.div_ceil(page_size);
        let start = (page - 1)
            .checked_mul(page_size)
            .ok_or_else(|| CmsError::InvalidCursor(format!("page {} is out of range", page)))?
            .min(total);
        let end = (start + page_size).min(total);

        let next_page = if end < total {
            let mut next = query.clone();
            next.page = page + 1;
            Some(encode_cursor(&next)?)
        } else {
            None
        };
        let prev_page = if page > 1 {
            let mut prev = query.clone();
            prev.page = page - 1;
            Some(encode_cursor(&prev)?)
        } else {
            None
        };

        let results: Vec<Document> = matching[start..end].to_vec();
        Ok(SearchResponse {
            page,
            results_per_page: page_size,
            results_size: results.len(),
            total_results_size: total,
            total_pages,
            next_page,
            prev_page,
            results,
        })
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn query(&self, query: &Query) -> Result<SearchResponse> {
        self.run(query)
    }

    async fn fetch_page(&self, cursor: &Cursor) -> Result<SearchResponse> {
        let query = decode_cursor(cursor)?;
        self.run(&query)
    }

    async fn get_by_uid(
        &self,
        document_type: &str,
        uid: &str,
        release: Option<&ReleaseRef>,
    ) -> Result<Document> {
        self.visible(release)?
            .into_iter()
            .find(|d| d.doc_type == document_type && d.uid.as_deref() == Some(uid))
            .ok_or_else(|| CmsError::NotFound(uid.to_string()))
    }
}

fn encode_cursor(query: &Query) -> Result<String> {
    Ok(format!("{}{}", CURSOR_SCHEME, serde_json::to_string(query)?))
}

fn decode_cursor(cursor: &Cursor) -> Result<Query> {
    let encoded = cursor
        .as_str()
        .strip_prefix(CURSOR_SCHEME)
        .ok_or_else(|| CmsError::InvalidCursor(cursor.to_string()))?;
    serde_json::from_str(encoded).map_err(|e| CmsError::InvalidCursor(format!("{}: {}", cursor, e)))
}

fn compare(a: &Document, b: &Document, orderings: &[Ordering]) -> CmpOrdering {
    for ordering in orderings {
        let ord = match ordering.field.as_str() {
            "document.first_publication_date" => {
                a.first_publication_date.cmp(&b.first_publication_date)
            }
            "document.last_publication_date" => {
                a.last_publication_date.cmp(&b.last_publication_date)
            }
            "document.id" => a.id.cmp(&b.id),
            field => {
                let key = field.rsplit('.').next().unwrap_or(field);
                data_key(a, key).cmp(&data_key(b, key))
            }
        };
        let ord = match ordering.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != CmpOrdering::Equal {
            return ord;
        }
    }
    CmpOrdering::Equal
}

fn data_key(doc: &Document, key: &str) -> String {
    match doc.data.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
