//! Generate static files

use anyhow::Result;

use crate::cms::ReleaseRef;
use crate::generator::{Generator, RenderOutcome};
use crate::Spacetraveling;

/// Generate the whole site
pub async fn run(site: &Spacetraveling, release: Option<ReleaseRef>) -> Result<()> {
    let start = std::time::Instant::now();

    let source = site.content_source()?;
    let generator = Generator::new(site, source, release)?;
    if generator.is_preview() {
        tracing::info!("Preview mode: rendering unpublished content");
    }

    let report = generator.generate().await?;

    let duration = start.elapsed();
    tracing::info!(
        "Generated {} articles and {} listing pages in {:.2}s",
        report.articles,
        report.listing_pages,
        duration.as_secs_f64()
    );

    if !report.failed.is_empty() {
        anyhow::bail!(
            "Failed to render {} article(s): {}",
            report.failed.len(),
            report.failed.join(", ")
        );
    }

    Ok(())
}

/// Render a single article page
pub async fn render_one(
    site: &Spacetraveling,
    uid: &str,
    release: Option<ReleaseRef>,
) -> Result<RenderOutcome> {
    let source = site.content_source()?;
    let generator = Generator::new(site, source, release)?;
    let outcome = generator.render_article(uid).await?;

    match &outcome {
        RenderOutcome::Rendered(path) => tracing::info!("Rendered {} to {:?}", uid, path),
        RenderOutcome::NotFound(_) => tracing::warn!("No article with uid {}", uid),
    }
    Ok(outcome)
}
