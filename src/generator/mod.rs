//! Generator module - renders CMS articles to static HTML files

use anyhow::{Context as _, Result};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tera::Context;
use walkdir::WalkDir;

use crate::adjacent::{AdjacentResolver, Neighbors};
use crate::cms::{ContentSource, Ordering, ReleaseRef};
use crate::content::{
    estimate_reading_minutes, rich_text, AdjacentLink, Article, ArticleSummary,
};
use crate::helpers::{
    date_xml, escape_html, format_date, format_date_time, full_url_for, is_safe_uid,
    listing_path, post_path, truncate_chars, url_for,
};
use crate::listing::{ListingPage, Paginator};
use crate::templates::{
    ListingEntryData, ListingPageData, NavPost, PostCardData, PostPageData, PreviewData,
    SectionData, SiteData, TemplateRenderer, THEME_ASSETS,
};
use crate::Spacetraveling;

/// Longest `<meta name="description">` written, in characters
const DESCRIPTION_LENGTH: usize = 160;

/// Result of rendering a single article on demand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The article page was written to this path
    Rendered(PathBuf),
    /// No such article; the not-found page lives at this path
    NotFound(PathBuf),
}

/// Summary of a full generation
#[derive(Debug, Clone, Default)]
pub struct GenerateReport {
    pub articles: usize,
    pub listing_pages: usize,
    /// Uids whose page could not be rendered
    pub failed: Vec<String>,
}

/// Static site generator over a content source
pub struct Generator {
    site: Spacetraveling,
    renderer: TemplateRenderer,
    source: Arc<dyn ContentSource>,
    release: Option<ReleaseRef>,
    paginator: Paginator,
    resolver: AdjacentResolver,
}

impl Generator {
    /// Create a new generator; `release` switches on preview mode
    pub fn new(
        site: &Spacetraveling,
        source: Arc<dyn ContentSource>,
        release: Option<ReleaseRef>,
    ) -> Result<Self> {
        let renderer = TemplateRenderer::new()?;
        let document_type = site.config.cms.document_type.clone();
        let paginator = Paginator::new(source.clone(), &document_type, release.clone());
        let resolver = AdjacentResolver::new(source.clone(), &document_type, release.clone());

        Ok(Self {
            site: site.clone(),
            renderer,
            source,
            release,
            paginator,
            resolver,
        })
    }

    pub fn is_preview(&self) -> bool {
        self.release.is_some()
    }

    pub fn site(&self) -> &Spacetraveling {
        &self.site
    }

    /// Generate the entire site
    pub async fn generate(&self) -> Result<GenerateReport> {
        fs::create_dir_all(&self.site.public_dir)
            .with_context(|| format!("Failed to create {:?}", self.site.public_dir))?;

        self.write_theme_assets()?;
        self.copy_source_assets()?;

        let initial = self
            .paginator
            .fetch_initial_listing(self.site.config.per_page, Ordering::newest_first())
            .await
            .context("Failed to fetch the article listing")?;
        let pages = self
            .paginator
            .collect_pages(initial)
            .await
            .context("Failed to page through the article listing")?;

        self.generate_index_pages(&pages)?;

        let summaries: Vec<ArticleSummary> = pages.iter().flat_map(|p| p.articles.clone()).collect();
        let mut report = self.generate_article_pages(&summaries).await;
        report.listing_pages = pages.len();

        self.generate_not_found()?;

        Ok(report)
    }

    /// Render one article page on demand
    pub async fn render_article(&self, uid: &str) -> Result<RenderOutcome> {
        if !is_safe_uid(uid) {
            tracing::debug!("Refusing to render unsafe uid {:?}", uid);
            return Ok(RenderOutcome::NotFound(self.generate_not_found()?));
        }

        let article = match self.fetch_article(uid).await {
            Ok(article) => article,
            Err(e) if e.is_not_found() => {
                tracing::info!("Article {} not found", uid);
                return Ok(RenderOutcome::NotFound(self.generate_not_found()?));
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to fetch article {}", uid)),
        };

        let neighbors = self.resolver.resolve_neighbors(&article.summary()).await;
        let path = self.write_article_page(&article, &neighbors)?;
        Ok(RenderOutcome::Rendered(path))
    }

    async fn fetch_article(&self, uid: &str) -> crate::cms::Result<Article> {
        let doc = self
            .source
            .get_by_uid(&self.site.config.cms.document_type, uid, self.release.as_ref())
            .await?;
        Article::try_from(doc)
    }

    /// Render every listed article, a bounded number at a time
    async fn generate_article_pages(&self, summaries: &[ArticleSummary]) -> GenerateReport {
        let mut report = GenerateReport::default();
        let mut seen = HashSet::new();
        let mut unique: Vec<&ArticleSummary> = Vec::new();
        for summary in summaries {
            if !seen.insert(summary.uid.as_str()) {
                continue;
            }
            if is_safe_uid(&summary.uid) {
                unique.push(summary);
            } else {
                tracing::error!("Article uid {:?} cannot be used as a path", summary.uid);
                report.failed.push(summary.uid.clone());
            }
        }

        let concurrency = self.site.config.cms.concurrency.max(1);
        let renders: Vec<BoxFuture<'_, (String, Result<Option<PathBuf>>)>> = unique
            .into_iter()
            .map(|summary| {
                async move { (summary.uid.clone(), self.render_listed_article(summary).await) }
                    .boxed()
            })
            .collect();
        let results: Vec<(String, Result<Option<PathBuf>>)> = futures::stream::iter(renders)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (uid, result) in results {
            match result {
                Ok(Some(path)) => {
                    report.articles += 1;
                    tracing::debug!("Generated post: {:?}", path);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Failed to render {}: {:#}", uid, e);
                    report.failed.push(uid);
                }
            }
        }

        tracing::info!("Generated {} article pages", report.articles);
        report
    }

    /// The article and its neighbors are fetched concurrently
    async fn render_listed_article(&self, summary: &ArticleSummary) -> Result<Option<PathBuf>> {
        let (article, neighbors) = futures::join!(
            self.fetch_article(&summary.uid),
            self.resolver.resolve_neighbors(summary),
        );

        match article {
            Ok(article) => Ok(Some(self.write_article_page(&article, &neighbors)?)),
            Err(e) if e.is_not_found() => {
                tracing::warn!("{} was listed but no longer exists", summary.uid);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Generate the home page and the listing pages behind "load more"
    fn generate_index_pages(&self, pages: &[ListingPage]) -> Result<()> {
        let next_link = |index: usize| {
            (index + 1 < pages.len()).then(|| url_for(&self.site.config, &listing_path(index + 2)))
        };

        for (index, page) in pages.iter().enumerate() {
            let entries = page
                .articles
                .iter()
                .map(|summary| self.listing_entry(summary))
                .collect::<Result<Vec<_>>>()?;

            if index == 0 {
                let mut context = self.create_base_context(&self.site.config.description);
                context.insert("posts", &entries);
                context.insert("next_page", &next_link(index));
                let html = self.renderer.render("index.html", &context)?;
                self.write_output("index.html", &html)?;
            } else {
                let data = ListingPageData {
                    results: entries,
                    next_page: next_link(index),
                };
                let json = serde_json::to_string(&data)?;
                self.write_output(&listing_path(index + 1), &json)?;
            }
        }

        tracing::info!("Generated home page with {} listing pages", pages.len());
        Ok(())
    }

    /// Generate the not-found page
    fn generate_not_found(&self) -> Result<PathBuf> {
        let context = self.create_base_context("");
        let html = self.renderer.render("not_found.html", &context)?;
        self.write_output("404.html", &html)
    }

    fn write_article_page(&self, article: &Article, neighbors: &Neighbors) -> Result<PathBuf> {
        let post = self.post_page(article, neighbors);

        let mut context = self.create_base_context(&post.subtitle);
        context.insert("post", &post);
        context.insert("comments_script", &self.comments_script());

        let html = self.renderer.render("post.html", &context)?;
        self.write_output(&format!("{}index.html", post_path(&article.uid)), &html)
    }

    fn comments_script(&self) -> Option<String> {
        let comments = &self.site.config.comments;
        // Drafts would open a discussion for a page that is not public
        (comments.enabled() && !self.is_preview()).then(|| crate::helpers::comments_script(comments))
    }

    /// Create a base context with common variables
    fn create_base_context(&self, description: &str) -> Context {
        let config = &self.site.config;
        let site = SiteData {
            title: escape_html(&config.title),
            language: config.language.clone(),
            root: url_for(config, ""),
            css: url_for(config, "css/style.css"),
            logo: url_for(config, "images/logo.svg"),
        };
        let preview = PreviewData {
            enabled: self.is_preview(),
            exit_url: config.preview.exit_url.clone(),
        };

        let mut context = Context::new();
        context.insert("site", &site);
        context.insert("preview", &preview);
        // Cut before escaping so no entity is split
        let description = truncate_chars(description, DESCRIPTION_LENGTH);
        context.insert("page_description", &escape_html(&description));
        context
    }

    fn listing_entry(&self, summary: &ArticleSummary) -> Result<ListingEntryData> {
        let post = self.post_card(summary);
        let mut context = self.create_base_context("");
        context.insert("post", &post);
        let html = self.renderer.render("partials/post_card.html", &context)?;
        Ok(ListingEntryData { post, html })
    }

    fn post_card(&self, summary: &ArticleSummary) -> PostCardData {
        let (date, datetime) = self.display_dates(summary.first_publication_date);
        PostCardData {
            uid: summary.uid.clone(),
            path: url_for(&self.site.config, &post_path(&summary.uid)),
            title: escape_html(&summary.title),
            subtitle: escape_html(&summary.subtitle),
            author: escape_html(&summary.author),
            date,
            datetime,
        }
    }

    fn post_page(&self, article: &Article, neighbors: &Neighbors) -> PostPageData {
        let config = &self.site.config;
        let tz = config.tz();
        let (date, datetime) = self.display_dates(article.first_publication_date);
        let path = post_path(&article.uid);

        let sections = article
            .sections
            .iter()
            .map(|section| SectionData {
                heading: escape_html(&section.heading),
                anchor: slug::slugify(&section.heading),
                html: rich_text::as_html(&section.body),
            })
            .collect();

        PostPageData {
            uid: article.uid.clone(),
            path: url_for(config, &path),
            permalink: full_url_for(config, &path),
            title: escape_html(&article.title),
            subtitle: escape_html(&article.subtitle),
            author: escape_html(&article.author),
            banner_url: escape_html(&article.banner_url),
            date,
            datetime,
            edited: article
                .edited_at()
                .map(|date| format_date_time(&date, &tz, &config.language)),
            reading_minutes: estimate_reading_minutes(&article.sections),
            sections,
            previous: neighbors.previous.as_ref().map(|link| self.nav_post(link)),
            next: neighbors.next.as_ref().map(|link| self.nav_post(link)),
        }
    }

    fn nav_post(&self, link: &AdjacentLink) -> NavPost {
        NavPost {
            title: escape_html(&link.title),
            path: url_for(&self.site.config, &post_path(&link.uid)),
        }
    }

    fn display_dates(
        &self,
        date: Option<chrono::DateTime<chrono::Utc>>,
    ) -> (Option<String>, Option<String>) {
        let config = &self.site.config;
        match date {
            Some(date) => (
                Some(format_date(&date, &config.tz(), &config.language)),
                Some(date_xml(&date)),
            ),
            None => (None, None),
        }
    }

    /// Write a file below the public directory
    fn write_output(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let output_path = self.site.public_dir.join(relative.trim_start_matches('/'));
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Failed to create dir {:?}: {}", parent, e))?;
        }
        fs::write(&output_path, contents)
            .map_err(|e| anyhow::anyhow!("Failed to write {:?}: {}", output_path, e))?;
        Ok(output_path)
    }

    fn write_theme_assets(&self) -> Result<()> {
        for (relative, contents) in THEME_ASSETS {
            self.write_output(relative, contents)?;
        }
        Ok(())
    }

    /// Copy source assets (images, favicons, etc.) to public directory
    fn copy_source_assets(&self) -> Result<()> {
        let source_dir = &self.site.source_dir;
        if !source_dir.exists() {
            return Ok(());
        }

        for entry in WalkDir::new(source_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let relative = path.strip_prefix(source_dir)?;
            let dest = self.site.public_dir.join(relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(path, &dest)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::{Document, MemorySource};
    use chrono::{TimeZone, Utc};

    fn doc(n: u32, words: usize) -> Document {
        let body = vec!["palavra"; words].join(" ");
        Document {
            id: format!("id-{}", n),
            uid: Some(format!("post-{}", n)),
            doc_type: "post".to_string(),
            first_publication_date: Some(Utc.with_ymd_and_hms(2021, 3, n, 12, 0, 0).unwrap()),
            last_publication_date: Some(Utc.with_ymd_and_hms(2021, 3, n, 12, 0, 0).unwrap()),
            data: serde_json::json!({
                "title": format!("Post <{}>", n),
                "subtitle": format!("Subtitle {}", n),
                "author": "Joseph Oliveira",
                "banner": { "url": format!("https://images.example.com/{}.png", n) },
                "content": [{
                    "heading": "Heading",
                    "body": [{ "type": "paragraph", "text": body, "spans": [] }]
                }]
            }),
        }
    }

    fn site(dir: &std::path::Path, per_page: usize) -> Spacetraveling {
        let mut site = Spacetraveling::new(dir).unwrap();
        site.config.per_page = per_page;
        site.config.timezone = "UTC".to_string();
        site
    }

    fn generator(site: &Spacetraveling, source: MemorySource, release: Option<ReleaseRef>) -> Generator {
        Generator::new(site, Arc::new(source), release).unwrap()
    }

    fn read(site: &Spacetraveling, relative: &str) -> String {
        fs::read_to_string(site.public_dir.join(relative)).unwrap()
    }

    #[tokio::test]
    async fn test_generate_site() {
        let dir = tempfile::tempdir().unwrap();
        let site = site(dir.path(), 2);
        let docs = (1..=5).map(|n| doc(n, 399)).collect();
        let report = generator(&site, MemorySource::new(docs), None)
            .generate()
            .await
            .unwrap();

        assert_eq!(report.articles, 5);
        assert_eq!(report.listing_pages, 3);
        assert!(report.failed.is_empty());

        let index = read(&site, "index.html");
        assert!(index.contains("Post &lt;5&gt;"));
        assert!(index.contains("Post &lt;4&gt;"));
        assert!(!index.contains("Post &lt;3&gt;"));
        assert!(index.contains(r#"data-next="/api/posts/2.json""#));

        let page2: serde_json::Value = serde_json::from_str(&read(&site, "api/posts/2.json")).unwrap();
        assert_eq!(page2["results"][0]["uid"], "post-3");
        assert_eq!(page2["next_page"], "/api/posts/3.json");
        let page3: serde_json::Value = serde_json::from_str(&read(&site, "api/posts/3.json")).unwrap();
        assert_eq!(page3["results"][0]["uid"], "post-1");
        assert!(page3["next_page"].is_null());

        let post = read(&site, "post/post-3/index.html");
        // 1 heading word + 399 body words
        assert!(post.contains("2 min"));
        assert!(post.contains("3 mar 2021"));
        assert!(post.contains(r#"href="/post/post-2/""#));
        assert!(post.contains(r#"href="/post/post-4/""#));
        assert!(!post.contains("editado em"));
        assert!(post.contains(r#"<link rel="canonical" href="http://localhost:4000/post/post-3/">"#));
        assert!(post.contains(r#"<h2 id="heading">Heading</h2>"#));
        assert!(!index.contains("reading-time"));

        assert!(site.public_dir.join("404.html").exists());
        assert!(site.public_dir.join("css/style.css").exists());
    }

    #[tokio::test]
    async fn test_uid_with_underscore_is_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let site = site(dir.path(), 4);
        let mut post = doc(1, 10);
        post.uid = Some("meu_post".to_string());
        let generator = generator(&site, MemorySource::new(vec![post]), None);

        let report = generator.generate().await.unwrap();
        assert_eq!(report.articles, 1);
        assert!(report.failed.is_empty());
        assert!(read(&site, "index.html").contains(r#"href="/post/meu_post/""#));
        assert!(site.public_dir.join("post/meu_post/index.html").exists());

        let outcome = generator.render_article("meu_post").await.unwrap();
        assert_eq!(
            outcome,
            RenderOutcome::Rendered(site.public_dir.join("post/meu_post/index.html"))
        );
    }

    #[tokio::test]
    async fn test_uid_unusable_as_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let site = site(dir.path(), 4);
        let mut bad = doc(2, 10);
        bad.uid = Some("..".to_string());
        let report = generator(&site, MemorySource::new(vec![doc(1, 10), bad]), None)
            .generate()
            .await
            .unwrap();

        assert_eq!(report.articles, 1);
        assert_eq!(report.failed, vec!["..".to_string()]);
    }

    #[tokio::test]
    async fn test_description_is_cut_before_escaping() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = site(dir.path(), 4);
        site.config.description = "&".repeat(200);
        generator(&site, MemorySource::new(vec![doc(1, 10)]), None)
            .generate()
            .await
            .unwrap();

        let expected = format!(r#"<meta name="description" content="{}...">"#, "&amp;".repeat(160));
        assert!(read(&site, "index.html").contains(&expected));
    }

    #[tokio::test]
    async fn test_single_page_listing_has_no_load_more() {
        let dir = tempfile::tempdir().unwrap();
        let site = site(dir.path(), 4);
        let docs = (1..=3).map(|n| doc(n, 10)).collect();
        generator(&site, MemorySource::new(docs), None)
            .generate()
            .await
            .unwrap();

        let index = read(&site, "index.html");
        assert!(!index.contains("Carregar mais posts"));
        assert!(!site.public_dir.join("api/posts/2.json").exists());
    }

    #[tokio::test]
    async fn test_render_article_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let site = site(dir.path(), 4);
        let mut edited = doc(2, 10);
        edited.last_publication_date = Some(Utc.with_ymd_and_hms(2021, 3, 9, 20, 10, 0).unwrap());
        let generator = generator(&site, MemorySource::new(vec![doc(1, 10), edited]), None);

        let outcome = generator.render_article("post-2").await.unwrap();
        let expected = site.public_dir.join("post/post-2/index.html");
        assert_eq!(outcome, RenderOutcome::Rendered(expected));

        let post = read(&site, "post/post-2/index.html");
        assert!(post.contains("* editado em 9 mar 2021, às 20:10"));
        assert!(post.contains("Post anterior"));
        assert!(!post.contains("Próximo post"));
    }

    #[tokio::test]
    async fn test_missing_article_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let site = site(dir.path(), 4);
        let generator = generator(&site, MemorySource::new(vec![doc(1, 10)]), None);

        let outcome = generator.render_article("does-not-exist").await.unwrap();
        assert_eq!(outcome, RenderOutcome::NotFound(site.public_dir.join("404.html")));

        let outcome = generator.render_article("../escape").await.unwrap();
        assert!(matches!(outcome, RenderOutcome::NotFound(_)));
    }

    #[tokio::test]
    async fn test_preview_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = site(dir.path(), 4);
        site.config.comments.repo = "someone/comments".to_string();

        let release = ReleaseRef::new("preview");
        let mut draft = doc(9, 10);
        draft.first_publication_date = None;
        draft.last_publication_date = None;
        let source = MemorySource::new(vec![doc(1, 10)]).with_release(&release, vec![draft]);

        let preview = generator(&site, source.clone(), Some(release));
        preview.render_article("post-9").await.unwrap();
        let post = read(&site, "post/post-9/index.html");
        assert!(post.contains("Sair do modo Preview"));
        assert!(!post.contains("utteranc.es"));

        let published = generator(&site, source, None);
        let outcome = published.render_article("post-9").await.unwrap();
        assert!(matches!(outcome, RenderOutcome::NotFound(_)));
        published.render_article("post-1").await.unwrap();
        let post = read(&site, "post/post-1/index.html");
        assert!(!post.contains("Sair do modo Preview"));
        assert!(post.contains(r#"repo="someone/comments""#));
    }

    #[tokio::test]
    async fn test_source_assets_are_copied() {
        let dir = tempfile::tempdir().unwrap();
        let site = site(dir.path(), 4);
        fs::create_dir_all(site.source_dir.join("images")).unwrap();
        fs::write(site.source_dir.join("images/favicon.png"), b"png").unwrap();

        generator(&site, MemorySource::new(vec![doc(1, 10)]), None)
            .generate()
            .await
            .unwrap();
        assert_eq!(fs::read(site.public_dir.join("images/favicon.png")).unwrap(), b"png");
    }
}
