//! List articles from the content source

use anyhow::Result;

use crate::cms::{Ordering, ReleaseRef};
use crate::helpers::format_date;
use crate::listing::{ListingState, LoadStatus, Paginator};
use crate::Spacetraveling;

/// Print the article listing page by page, following "load more" until the end
pub async fn run(site: &Spacetraveling, release: Option<ReleaseRef>) -> Result<()> {
    let source = site.content_source()?;
    let paginator = Paginator::new(source, &site.config.cms.document_type, release);
    let state = collect(&paginator, site.config.per_page).await?;

    let tz = site.config.tz();
    println!("Articles ({}):", state.articles().len());
    for article in state.articles() {
        let date = article
            .first_publication_date
            .map(|d| format_date(&d, &tz, &site.config.language))
            .unwrap_or_else(|| "draft".to_string());
        println!("  {} - {} [{}]", date, article.title, article.uid);
    }

    if let LoadStatus::Failed(reason) = state.status() {
        anyhow::bail!("Listing is incomplete: {}", reason);
    }

    Ok(())
}

async fn collect(paginator: &Paginator, per_page: usize) -> Result<ListingState> {
    let initial = paginator
        .fetch_initial_listing(per_page, Ordering::newest_first())
        .await?;
    let mut state = ListingState::new(initial);
    let mut page = 1;

    while state.has_more() {
        page += 1;
        tracing::debug!("Loading page {}", page);
        state = paginator.load_more(state).await;
        if matches!(state.status(), LoadStatus::Failed(_)) {
            break;
        }
    }

    Ok(state)
}
