use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::base::{ensure_renderer, Cap, ScrapeOptions, ScrapeOutcome, SourceAdapter, SourceContext};
use crate::common::constants::{TICKETMASTER_API_URL, TICKETMASTER_PAGE_SIZE};
use crate::common::error::{Result, ScraperError};
use crate::domain::EventSource;
use crate::observability::metrics;
use crate::pipeline::processing::normalize::{RawRecord, RawTicketmasterEvent};

/// One page of Discovery API results. Events stay as JSON so one odd record can't sink
/// the whole page.
#[derive(Debug, Deserialize)]
struct DiscoveryPage {
    #[serde(rename = "_embedded", default)]
    embedded: Option<DiscoveryEvents>,
    page: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryEvents {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    number: usize,
    total_pages: usize,
}

/// Ticketmaster Discovery API v2. Listing only, no detail fetches.
pub struct TicketmasterApi;

impl TicketmasterApi {
    pub fn new() -> Self {
        Self
    }

    fn page_url(&self, options: &ScrapeOptions, api_key: &str, page: usize, size: usize) -> Result<Url> {
        let base = options.listing_url.as_deref().unwrap_or(TICKETMASTER_API_URL);
        let mut params: Vec<(String, String)> = vec![
            ("apikey".into(), api_key.to_string()),
            ("countryCode".into(), "AU".into()),
            ("stateCode".into(), "VIC".into()),
            ("city".into(), "Melbourne".into()),
            ("sort".into(), "date,asc".into()),
            ("size".into(), size.to_string()),
            ("page".into(), page.to_string()),
        ];
        for (name, value) in &options.query {
            match params.iter_mut().find(|(n, _)| n == name) {
                Some(existing) => existing.1 = value.clone(),
                None => params.push((name.clone(), value.clone())),
            }
        }
        Url::parse_with_params(base, &params)
            .map_err(|e| ScraperError::Config(format!("invalid Ticketmaster URL '{}': {}", base, e)))
    }
}

impl Default for TicketmasterApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for TicketmasterApi {
    fn source(&self) -> EventSource {
        EventSource::Ticketmaster
    }

    fn validate(&self, options: &ScrapeOptions, has_renderer: bool) -> Result<()> {
        ensure_renderer(self.source(), options, has_renderer)?;
        let key = options.require_api_key(self.source())?;
        self.page_url(options, key, 0, 1).map(|_| ())
    }

    #[instrument(skip(self, options, ctx), fields(source = "ticketmaster"))]
    async fn scrape(&self, options: &ScrapeOptions, ctx: &SourceContext) -> Result<ScrapeOutcome> {
        let started = Instant::now();
        let source = self.source();
        let api_key = options.require_api_key(source)?;
        let size = match options.max_events {
            Cap::Limited(n) => n.clamp(1, TICKETMASTER_PAGE_SIZE),
            Cap::Unbounded => TICKETMASTER_PAGE_SIZE,
        };
        let mut outcome = ScrapeOutcome::default();

        for page in 0..options.max_pages.max(1) {
            let url = self.page_url(options, api_key, page, size)?;
            let body: DiscoveryPage = match ctx.get_json(url.as_str(), &[]).await {
                Ok(body) => body,
                Err(e) if page == 0 => return Err(e),
                Err(ScraperError::Cancelled) => {
                    outcome.truncated_by_cancel = true;
                    break;
                }
                Err(e) => {
                    warn!(page, error = %e, "Discovery page failed, stopping pagination");
                    break;
                }
            };

            let events = body.embedded.map(|e| e.events).unwrap_or_default();
            debug!(page, count = events.len(), "Discovery page received");
            if events.is_empty() {
                break;
            }
            for value in events {
                if !options.max_events.allows(outcome.fetched) {
                    break;
                }
                match serde_json::from_value::<RawTicketmasterEvent>(value) {
                    Ok(raw) => outcome.accept(RawRecord::Ticketmaster(raw), Utc::now()),
                    Err(e) => outcome.undecodable(source, &e),
                }
            }

            let last_page = body
                .page
                .map(|p| p.number + 1 >= p.total_pages)
                .unwrap_or(true);
            if last_page || !options.max_events.allows(outcome.fetched) {
                break;
            }
        }

        metrics::sources::scrape_finished(source, outcome.fetched, started.elapsed().as_secs_f64());
        info!(
            fetched = outcome.fetched,
            normalized = outcome.events.len(),
            mapping_errors = outcome.mapping_errors,
            "Scrape finished"
        );
        Ok(outcome)
    }
}
