//! Article models built from content documents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rich_text::RichTextBlock;
use crate::cms::{null_as_default, CmsError, Document};

/// A full blog article
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    /// Content service document id
    pub id: String,

    /// URL-safe slug
    pub uid: String,

    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub banner_url: String,

    /// `None` while the article is an unpublished draft
    pub first_publication_date: Option<DateTime<Utc>>,
    pub last_publication_date: Option<DateTime<Utc>>,

    pub sections: Vec<ContentSection>,
}

impl Article {
    /// Summary of this article as it appears in listings
    pub fn summary(&self) -> ArticleSummary {
        ArticleSummary {
            id: self.id.clone(),
            uid: self.uid.clone(),
            first_publication_date: self.first_publication_date,
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            author: self.author.clone(),
        }
    }

    /// Last publication date when it differs from the first one
    pub fn edited_at(&self) -> Option<DateTime<Utc>> {
        match (self.first_publication_date, self.last_publication_date) {
            (Some(first), Some(last)) if last != first => Some(last),
            _ => None,
        }
    }
}

/// A heading followed by rich-text body blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub heading: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub body: Vec<RichTextBlock>,
}

impl ContentSection {
    pub fn new(heading: impl Into<String>, body: Vec<RichTextBlock>) -> Self {
        Self {
            heading: heading.into(),
            body,
        }
    }
}

/// Listing entry: the subset of article fields shown on the home page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub id: String,
    pub uid: String,
    pub first_publication_date: Option<DateTime<Utc>>,
    pub title: String,
    pub subtitle: String,
    pub author: String,
}

/// Link to the chronological neighbor of an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjacentLink {
    pub title: String,
    pub uid: String,
}

/// `data` fields of a post document
#[derive(Debug, Default, Deserialize)]
struct PostFields {
    #[serde(default, deserialize_with = "null_as_default")]
    title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    subtitle: String,
    #[serde(default, deserialize_with = "null_as_default")]
    author: String,
    #[serde(default, deserialize_with = "null_as_default")]
    banner: ImageField,
    #[serde(default, deserialize_with = "null_as_default")]
    content: Vec<ContentSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageField {
    #[serde(default, deserialize_with = "null_as_default")]
    url: String,
}

fn post_fields(doc: &Document) -> Result<PostFields, CmsError> {
    if doc.data.is_null() {
        return Ok(PostFields::default());
    }
    PostFields::deserialize(&doc.data).map_err(|e| CmsError::malformed(&doc.id, e.to_string()))
}

fn require_uid(doc: &Document) -> Result<String, CmsError> {
    doc.uid
        .clone()
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| CmsError::malformed(&doc.id, "document has no uid"))
}

impl TryFrom<Document> for Article {
    type Error = CmsError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        let uid = require_uid(&doc)?;
        let fields = post_fields(&doc)?;
        Ok(Self {
            id: doc.id,
            uid,
            title: fields.title,
            subtitle: fields.subtitle,
            author: fields.author,
            banner_url: fields.banner.url,
            first_publication_date: doc.first_publication_date,
            last_publication_date: doc.last_publication_date,
            sections: fields.content,
        })
    }
}

impl TryFrom<Document> for ArticleSummary {
    type Error = CmsError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        let uid = require_uid(&doc)?;
        let fields = post_fields(&doc)?;
        Ok(Self {
            id: doc.id,
            uid,
            first_publication_date: doc.first_publication_date,
            title: fields.title,
            subtitle: fields.subtitle,
            author: fields.author,
        })
    }
}

impl TryFrom<Document> for AdjacentLink {
    type Error = CmsError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        let uid = require_uid(&doc)?;
        let fields = post_fields(&doc)?;
        Ok(Self {
            title: fields.title,
            uid,
        })
    }
}
