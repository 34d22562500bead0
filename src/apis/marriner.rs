use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

use super::page_crawler::{PageCrawler, PageSite};
use super::parsers::html::{all_text, first_text, is_below};
use super::parsers::{collect_links, page_record};
use crate::common::constants::MARRINER_LISTING_URL;
use crate::domain::EventSource;
use crate::pipeline::processing::normalize::RawPageRecord;

static SHOW_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));
static THEATRE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".show-venue, .show__venue, .venue").expect("valid venue selector")
});
static PRICE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".show-price, .show__price, .prices").expect("valid price selector")
});

/// Marriner Group's shows across the Princess, Regent, Comedy and Forum theatres.
pub struct MarrinerSite;

pub type MarrinerCrawler = PageCrawler<MarrinerSite>;

impl MarrinerCrawler {
    pub fn marriner() -> Self {
        PageCrawler::new(MarrinerSite)
    }
}

impl PageSite for MarrinerSite {
    fn source(&self) -> EventSource {
        EventSource::Marriner
    }

    fn default_listing_url(&self) -> &'static str {
        MARRINER_LISTING_URL
    }

    fn detail_links(&self, listing: &Html, base: &Url) -> Vec<String> {
        collect_links(listing, base, &SHOW_LINKS, |url| is_below(url, base, "/shows/"))
    }

    fn parse_detail(&self, document: &Html, url: &str) -> Option<RawPageRecord> {
        let mut record = page_record(document, url)?;
        if record.venue_name.is_none() {
            record.venue_name = first_text(document, &THEATRE);
        }
        if record.price_min.is_none() && record.price_texts.is_empty() {
            record.price_texts = all_text(document, &PRICE);
        }
        if record.categories.is_empty() {
            record.categories.push("Theatre".to_string());
        }
        Some(record)
    }
}
