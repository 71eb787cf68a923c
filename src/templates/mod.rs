//! Built-in spacetraveling theme using the Tera template engine
//!
//! All templates and theme assets are embedded directly in the binary.

use anyhow::Result;
use serde::Serialize;
use tera::{Context, Tera};

/// Theme assets written to the public directory: (relative path, contents)
pub const THEME_ASSETS: &[(&str, &str)] = &[
    ("css/style.css", include_str!("spacetraveling/assets/style.css")),
    ("images/logo.svg", include_str!("spacetraveling/assets/logo.svg")),
];

/// Template renderer with the embedded theme
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Create a new renderer with all theme templates loaded
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();

        // Text fields are escaped when the context data is built; URLs and
        // serialized rich text must go through untouched
        tera.autoescape_on(vec![]);

        tera.add_raw_templates(vec![
            ("layout.html", include_str!("spacetraveling/layout.html")),
            ("index.html", include_str!("spacetraveling/index.html")),
            ("post.html", include_str!("spacetraveling/post.html")),
            ("not_found.html", include_str!("spacetraveling/not_found.html")),
            // Partials
            (
                "partials/header.html",
                include_str!("spacetraveling/partials/header.html"),
            ),
            (
                "partials/preview.html",
                include_str!("spacetraveling/partials/preview.html"),
            ),
            (
                "partials/info.html",
                include_str!("spacetraveling/partials/info.html"),
            ),
            (
                "partials/post_card.html",
                include_str!("spacetraveling/partials/post_card.html"),
            ),
        ])?;

        Ok(Self { tera })
    }

    /// Render a template with given context
    pub fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template_name, context)?)
    }
}

/// Data structures for template context

#[derive(Debug, Clone, Serialize)]
pub struct SiteData {
    pub title: String,
    pub language: String,
    pub root: String,
    pub css: String,
    pub logo: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewData {
    pub enabled: bool,
    pub exit_url: String,
}

/// A listing entry on the home page
#[derive(Debug, Clone, Serialize)]
pub struct PostCardData {
    pub uid: String,
    pub path: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub date: Option<String>,
    pub datetime: Option<String>,
}

/// A rendered listing entry, as embedded in the home page and listing JSON
#[derive(Debug, Clone, Serialize)]
pub struct ListingEntryData {
    #[serde(flatten)]
    pub post: PostCardData,
    pub html: String,
}

/// Body of a static listing page fetched by "load more"
#[derive(Debug, Clone, Serialize)]
pub struct ListingPageData {
    pub results: Vec<ListingEntryData>,
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPageData {
    pub uid: String,
    pub path: String,
    pub permalink: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub banner_url: String,
    pub date: Option<String>,
    pub datetime: Option<String>,
    pub edited: Option<String>,
    pub reading_minutes: u32,
    pub sections: Vec<SectionData>,
    pub previous: Option<NavPost>,
    pub next: Option<NavPost>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionData {
    pub heading: String,
    /// Fragment id of the heading
    pub anchor: String,
    pub html: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavPost {
    pub title: String,
    pub path: String,
}
