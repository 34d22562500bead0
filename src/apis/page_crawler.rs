use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use scraper::Html;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::base::{
    ensure_renderer, ScrapeOptions, ScrapeOutcome, SourceAdapter, SourceContext,
};
use super::parsers::page_record;
use crate::common::error::{Result, ScraperError};
use crate::domain::EventSource;
use crate::observability::metrics;
use crate::pipeline::processing::normalize::{RawPageRecord, RawRecord};

/// Site-specific knowledge for a listing-then-detail source.
pub trait PageSite: Send + Sync {
    fn source(&self) -> EventSource;

    fn default_listing_url(&self) -> &'static str;

    /// Whether the site builds its pages client-side.
    fn prefers_headless(&self) -> bool {
        false
    }

    /// URL of listing page `page` (1-based), or `None` once the site has no more pages.
    fn listing_page_url(&self, base: &Url, page: usize) -> Option<Url> {
        (page == 1).then(|| base.clone())
    }

    /// Detail links on one listing page, in listing order.
    fn detail_links(&self, listing: &Html, base: &Url) -> Vec<String>;

    /// Pull a page record out of a detail page.
    fn parse_detail(&self, document: &Html, url: &str) -> Option<RawPageRecord> {
        page_record(document, url)
    }
}

/// Listing pages -> detail links -> detail pages, for any [`PageSite`].
pub struct PageCrawler<S> {
    site: S,
}

impl<S: PageSite> PageCrawler<S> {
    pub fn new(site: S) -> Self {
        Self { site }
    }

    fn listing_base(&self, options: &ScrapeOptions) -> Result<Url> {
        let raw = options
            .listing_url
            .as_deref()
            .unwrap_or(self.site.default_listing_url());
        Url::parse(raw).map_err(|e| {
            ScraperError::Config(format!(
                "{} listing URL '{}' is invalid: {}",
                self.site.source(),
                raw,
                e
            ))
        })
    }

    /// Walk the listing pages. The first page failing is fatal; a later one ends pagination.
    async fn collect_links(
        &self,
        base: &Url,
        options: &ScrapeOptions,
        ctx: &SourceContext,
        outcome: &mut ScrapeOutcome,
    ) -> Result<Vec<String>> {
        let strategy = options.strategy();
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for page in 1..=options.max_pages.max(1) {
            let Some(url) = self.site.listing_page_url(base, page) else {
                break;
            };
            let body = match ctx.get_page(url.as_str(), strategy).await {
                Ok(body) => body,
                Err(e) if page == 1 => return Err(e),
                Err(ScraperError::Cancelled) => {
                    outcome.truncated_by_cancel = true;
                    break;
                }
                Err(e) => {
                    warn!(source = %self.site.source(), page, error = %e, "Listing page failed, stopping pagination");
                    break;
                }
            };

            let found = {
                let document = Html::parse_document(&body);
                self.site.detail_links(&document, base)
            };
            let before = links.len();
            for link in found {
                if seen.insert(link.clone()) {
                    links.push(link);
                }
            }
            debug!(source = %self.site.source(), page, new_links = links.len() - before, "Listing page parsed");

            if links.len() == before || !options.max_shows.allows(links.len()) {
                break;
            }
        }

        if let Some(limit) = options.max_shows.limit() {
            links.truncate(limit);
        }
        Ok(links)
    }
}

#[async_trait]
impl<S: PageSite> SourceAdapter for PageCrawler<S> {
    fn source(&self) -> EventSource {
        self.site.source()
    }

    fn prefers_headless(&self) -> bool {
        self.site.prefers_headless()
    }

    fn validate(&self, options: &ScrapeOptions, has_renderer: bool) -> Result<()> {
        ensure_renderer(self.site.source(), options, has_renderer)?;
        self.listing_base(options).map(|_| ())
    }

    #[instrument(skip(self, options, ctx), fields(source = %self.site.source()))]
    async fn scrape(&self, options: &ScrapeOptions, ctx: &SourceContext) -> Result<ScrapeOutcome> {
        let started = Instant::now();
        let source = self.site.source();
        let base = self.listing_base(options)?;
        let mut outcome = ScrapeOutcome::default();

        let links = self.collect_links(&base, options, ctx, &mut outcome).await?;
        let detail_cap = options.max_events.min(options.max_detail_fetches);
        info!(links = links.len(), ?detail_cap, "Collected detail links");

        let strategy = options.strategy();
        for (fetched, link) in links.iter().enumerate() {
            if !detail_cap.allows(fetched) {
                break;
            }
            if ctx.is_cancelled() {
                outcome.truncated_by_cancel = true;
                break;
            }
            let body = match ctx.get_page(link, strategy).await {
                Ok(body) => body,
                Err(ScraperError::Cancelled) => {
                    outcome.truncated_by_cancel = true;
                    break;
                }
                Err(e) => {
                    warn!(url = %link, error = %e, "Skipping detail page");
                    outcome.detail_failed(source);
                    continue;
                }
            };

            let parsed = {
                let document = Html::parse_document(&body);
                self.site.parse_detail(&document, link)
            };
            match parsed.and_then(|page| RawRecord::from_page(source, page)) {
                Some(record) => outcome.accept(record, Utc::now()),
                None => {
                    warn!(url = %link, "Detail page carried no event data");
                    outcome.detail_failed(source);
                }
            }
        }

        metrics::sources::scrape_finished(source, outcome.fetched, started.elapsed().as_secs_f64());
        info!(
            fetched = outcome.fetched,
            normalized = outcome.events.len(),
            mapping_errors = outcome.mapping_errors,
            detail_errors = outcome.detail_errors,
            truncated = outcome.truncated_by_cancel,
            "Scrape finished"
        );
        Ok(outcome)
    }
}
