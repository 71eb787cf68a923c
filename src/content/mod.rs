//! Content module - articles, rich text and reading time

mod article;
pub mod reading_time;
pub mod rich_text;

pub use article::{AdjacentLink, Article, ArticleSummary, ContentSection};
pub use reading_time::estimate_reading_minutes;
pub use rich_text::{RichTextBlock, Span};
