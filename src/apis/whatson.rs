use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

use super::page_crawler::{PageCrawler, PageSite};
use super::parsers::html::{all_text, first_text, is_below};
use super::parsers::{collect_links, page_record};
use crate::common::constants::WHATSON_LISTING_URL;
use crate::domain::EventSource;
use crate::pipeline::processing::normalize::RawPageRecord;

static ITEM_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));
static TAGS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".tags a, .page-tags a, .category-tag").expect("valid tag selector")
});
static LOCATION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".location-name, .page-location h3, .venue").expect("valid location selector")
});
static ADDRESS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".location-address, .page-location address").expect("valid address selector")
});
static PRICE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".price, .page-price, .cost").expect("valid price selector")
});

/// City of Melbourne's What's On guide. The listing is paginated with `?page=N`.
pub struct WhatsOnSite;

pub type WhatsOnCrawler = PageCrawler<WhatsOnSite>;

impl WhatsOnCrawler {
    pub fn whatson() -> Self {
        PageCrawler::new(WhatsOnSite)
    }
}

impl PageSite for WhatsOnSite {
    fn source(&self) -> EventSource {
        EventSource::Whatson
    }

    fn default_listing_url(&self) -> &'static str {
        WHATSON_LISTING_URL
    }

    fn listing_page_url(&self, base: &Url, page: usize) -> Option<Url> {
        let mut url = base.clone();
        if page > 1 {
            url.query_pairs_mut().append_pair("page", &page.to_string());
        }
        Some(url)
    }

    fn detail_links(&self, listing: &Html, base: &Url) -> Vec<String> {
        let prefix = format!("{}/", base.path().trim_end_matches('/'));
        collect_links(listing, base, &ITEM_LINKS, |url| {
            is_below(url, base, &prefix) && url.query().is_none()
        })
    }

    fn parse_detail(&self, document: &Html, url: &str) -> Option<RawPageRecord> {
        let mut record = page_record(document, url)?;
        if record.venue_name.is_none() {
            record.venue_name = first_text(document, &LOCATION);
        }
        if record.venue_address.is_none() {
            record.venue_address = first_text(document, &ADDRESS);
        }
        if record.price_min.is_none() && record.price_texts.is_empty() {
            record.price_texts = all_text(document, &PRICE);
        }
        record.categories.extend(all_text(document, &TAGS));
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::base::test_support::{context, FakeHttp};
    use crate::apis::base::{ScrapeOptions, SourceAdapter};
    use crate::domain::Category;
    use std::sync::Arc;

    const PAGE_TWO: &str = "https://whatson.melbourne.vic.gov.au/things-to-do?page=2";
    const PAGE_THREE: &str = "https://whatson.melbourne.vic.gov.au/things-to-do?page=3";

    fn detail(title: &str) -> String {
        format!(
            r#"<html><head><meta property="og:title" content="{title}"></head><body>
               <time datetime="2025-11-08">8 Nov</time>
               <p class="location-name">Federation Square</p>
               <p class="price">Free</p>
               <div class="tags"><a>Festivals</a><a>Family</a></div>
               </body></html>"#
        )
    }

    #[tokio::test]
    async fn test_paginates_until_no_new_links() {
        let http = Arc::new(
            FakeHttp::new()
                .with(
                    WHATSON_LISTING_URL,
                    200,
                    r#"<a href="/things-to-do/night-market">Night Market</a>
                       <a href="/things-to-do?page=2">Next</a>"#,
                )
                .with(
                    PAGE_TWO,
                    200,
                    r#"<a href="/things-to-do/lantern-festival">Lanterns</a>
                       <a href="/things-to-do/night-market">Night Market</a>"#,
                )
                .with(PAGE_THREE, 200, r#"<a href="/things-to-do/night-market">Night Market</a>"#)
                .with(
                    "https://whatson.melbourne.vic.gov.au/things-to-do/night-market",
                    200,
                    detail("Night Market"),
                )
                .with(
                    "https://whatson.melbourne.vic.gov.au/things-to-do/lantern-festival",
                    200,
                    detail("Lantern Festival"),
                ),
        );
        let ctx = context(EventSource::Whatson, http.clone());

        let outcome = WhatsOnCrawler::whatson()
            .scrape(&ScrapeOptions::default(), &ctx)
            .await
            .unwrap();

        assert_eq!(outcome.events.len(), 2);
        let lanterns = &outcome.events[1];
        assert_eq!(lanterns.source_id, "lantern-festival");
        assert!(lanterns.is_free);
        assert_eq!(lanterns.category, Category::Festival);
        assert_eq!(lanterns.venue.name, "Federation Square");

        // page 4 is never requested once page 3 adds nothing
        let requested = http.requested();
        assert!(requested.contains(&PAGE_THREE.to_string()));
        assert_eq!(requested.len(), 5);
    }

    #[tokio::test]
    async fn test_later_listing_failure_keeps_first_page() {
        let http = Arc::new(
            FakeHttp::new()
                .with(WHATSON_LISTING_URL, 200, r#"<a href="/things-to-do/night-market">x</a>"#)
                .with(
                    "https://whatson.melbourne.vic.gov.au/things-to-do/night-market",
                    200,
                    detail("Night Market"),
                ),
        );
        let ctx = context(EventSource::Whatson, http);
        let outcome = WhatsOnCrawler::whatson()
            .scrape(&ScrapeOptions::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.detail_errors, 0);
    }
}
