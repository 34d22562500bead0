use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;

use super::page_crawler::{PageCrawler, PageSite};
use super::parsers::html::{all_text, first_text};
use super::parsers::{collect_links, page_record};
use crate::common::constants::FEVERUP_LISTING_URL;
use crate::domain::EventSource;
use crate::pipeline::processing::normalize::RawPageRecord;

static PLAN_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*=\"/m/\"]").expect("valid plan link selector"));
static PLAN_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(?:[a-z]{2}/)?m/\d+").expect("valid plan path regex"));
static VENUE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[data-testid=\"plan-venue-name\"], .plan-venue__name, .location-name")
        .expect("valid venue selector")
});
static PRICE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[data-testid=\"plan-price\"], .plan-price, .price")
        .expect("valid price selector")
});

/// Fever's Melbourne city page. Plans live at `/m/<id>`; both pages render client-side.
pub struct FeverupSite;

pub type FeverupCrawler = PageCrawler<FeverupSite>;

impl FeverupCrawler {
    pub fn feverup() -> Self {
        PageCrawler::new(FeverupSite)
    }
}

impl PageSite for FeverupSite {
    fn source(&self) -> EventSource {
        EventSource::Feverup
    }

    fn default_listing_url(&self) -> &'static str {
        FEVERUP_LISTING_URL
    }

    fn prefers_headless(&self) -> bool {
        true
    }

    fn detail_links(&self, listing: &Html, base: &Url) -> Vec<String> {
        let mut links = collect_links(listing, base, &PLAN_LINKS, |url| {
            url.host_str().is_some_and(|h| h.ends_with("feverup.com")) && PLAN_PATH.is_match(url.path())
        });
        // tracking parameters would otherwise split one plan into several links
        let mut seen = HashSet::new();
        links.retain_mut(|link| {
            if let Some(idx) = link.find('?') {
                link.truncate(idx);
            }
            seen.insert(link.clone())
        });
        links
    }

    fn parse_detail(&self, document: &Html, url: &str) -> Option<RawPageRecord> {
        let mut record = page_record(document, url)?;
        if record.venue_name.is_none() {
            record.venue_name = first_text(document, &VENUE);
        }
        if record.price_min.is_none() && record.price_texts.is_empty() {
            record.price_texts = all_text(document, &PRICE);
        }
        Some(record)
    }
}
