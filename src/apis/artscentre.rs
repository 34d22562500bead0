use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

use super::page_crawler::{PageCrawler, PageSite};
use super::parsers::html::{all_text, first_text, is_below};
use super::parsers::{collect_links, page_record};
use crate::common::constants::ARTSCENTRE_LISTING_URL;
use crate::domain::EventSource;
use crate::pipeline::processing::normalize::RawPageRecord;

static EVENT_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));
static VENUE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".event-venue, .venue-name, [data-venue]").expect("valid venue selector")
});
static PRICE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".event-price, .price-range, .ticket-price").expect("valid price selector")
});
static GENRE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".event-genre, .genre-tag").expect("valid genre selector"));

/// Arts Centre Melbourne's "What's On". The listing is rendered client-side.
pub struct ArtsCentreSite;

pub type ArtsCentreCrawler = PageCrawler<ArtsCentreSite>;

impl ArtsCentreCrawler {
    pub fn artscentre() -> Self {
        PageCrawler::new(ArtsCentreSite)
    }
}

impl PageSite for ArtsCentreSite {
    fn source(&self) -> EventSource {
        EventSource::Artscentre
    }

    fn default_listing_url(&self) -> &'static str {
        ARTSCENTRE_LISTING_URL
    }

    fn prefers_headless(&self) -> bool {
        true
    }

    fn detail_links(&self, listing: &Html, base: &Url) -> Vec<String> {
        collect_links(listing, base, &EVENT_LINKS, |url| {
            is_below(url, base, "/whats-on/") && url.query().is_none()
        })
    }

    fn parse_detail(&self, document: &Html, url: &str) -> Option<RawPageRecord> {
        let mut record = page_record(document, url)?;
        if record.venue_name.is_none() {
            record.venue_name = first_text(document, &VENUE);
        }
        if record.price_min.is_none() && record.price_texts.is_empty() {
            record.price_texts = all_text(document, &PRICE);
        }
        if record.categories.is_empty() {
            record.categories = all_text(document, &GENRE);
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::base::test_support::{context, FakeHttp};
    use crate::apis::base::{ScrapeOptions, SourceAdapter};
    use crate::common::constants::ARTSCENTRE_VENUE_NAME;
    use std::sync::Arc;

    const LISTING: &str = r#"<html><body>
        <a href="/whats-on/2025/hamlet">Hamlet</a>
        <a href="/whats-on/2025/hamlet">Hamlet (again)</a>
        <a href="/whats-on?genre=dance">Dance</a>
        <a href="/whats-on/2025/swan-lake">Swan Lake</a>
        <a href="/visit">Visit</a>
    </body></html>"#;

    const SWAN_LAKE: &str = r#"<html><head>
        <meta property="og:title" content="Swan Lake | Arts Centre Melbourne">
        </head><body>
        <time datetime="2025-12-03T19:30">3 Dec</time>
        <p class="event-price">$65 - $210</p>
        <span class="event-genre">Ballet</span>
    </body></html>"#;

    #[tokio::test]
    async fn test_scrapes_listing_and_details() {
        let http = Arc::new(
            FakeHttp::new()
                .with(ARTSCENTRE_LISTING_URL, 200, LISTING)
                .with(
                    "https://www.artscentremelbourne.com.au/whats-on/2025/swan-lake",
                    200,
                    SWAN_LAKE,
                ),
        );
        let ctx = context(EventSource::Artscentre, http.clone());
        let crawler = ArtsCentreCrawler::artscentre();
        let options = ScrapeOptions {
            use_headless: true,
            ..Default::default()
        };

        let outcome = crawler.scrape(&options, &ctx).await.unwrap();

        // hamlet detail 404s and is skipped
        assert_eq!(outcome.detail_errors, 1);
        assert_eq!(outcome.events.len(), 1);
        let swan = &outcome.events[0];
        assert_eq!(swan.title, "Swan Lake");
        assert_eq!(swan.source_id, "swan-lake");
        assert_eq!(swan.venue.name, ARTSCENTRE_VENUE_NAME);
        assert_eq!(swan.price_min, Some(65.0));
        assert_eq!(swan.category, crate::domain::Category::Dance);

        assert_eq!(
            http.requested(),
            vec![
                ARTSCENTRE_LISTING_URL.to_string(),
                "https://www.artscentremelbourne.com.au/whats-on/2025/hamlet".to_string(),
                "https://www.artscentremelbourne.com.au/whats-on/2025/swan-lake".to_string(),
            ]
        );
    }

    #[test]
    fn test_headless_needs_render_service() {
        let crawler = ArtsCentreCrawler::artscentre();
        assert!(crawler.prefers_headless());
        let options = ScrapeOptions {
            use_headless: true,
            ..Default::default()
        };
        assert!(crawler.validate(&options, false).is_err());
        assert!(crawler.validate(&options, true).is_ok());
    }
}
