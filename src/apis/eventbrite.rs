use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::base::{ensure_renderer, ScrapeOptions, ScrapeOutcome, SourceAdapter, SourceContext};
use crate::common::constants::EVENTBRITE_API_URL;
use crate::common::error::{Result, ScraperError};
use crate::domain::EventSource;
use crate::observability::metrics;
use crate::pipeline::processing::normalize::{RawEventbriteEvent, RawRecord};

const ORGANIZATION_IDS: &str = "organization_ids";
const EXPANSIONS: &str = "venue,ticket_availability,category,subcategory,format";

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    events: Vec<serde_json::Value>,
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_more_items: bool,
    continuation: Option<String>,
}

/// Eventbrite v3 API, one organizer at a time.
pub struct EventbriteApi;

impl EventbriteApi {
    pub fn new() -> Self {
        Self
    }

    fn organization_ids(options: &ScrapeOptions) -> Vec<String> {
        options
            .query_value(ORGANIZATION_IDS)
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn events_url(&self, options: &ScrapeOptions, org: &str, continuation: Option<&str>) -> Result<Url> {
        let base = options.listing_url.as_deref().unwrap_or(EVENTBRITE_API_URL);
        let endpoint = format!("{}/organizations/{}/events/", base.trim_end_matches('/'), org);
        let mut params = vec![
            ("status", "live"),
            ("order_by", "start_asc"),
            ("expand", EXPANSIONS),
        ];
        if let Some(token) = continuation {
            params.push(("continuation", token));
        }
        Url::parse_with_params(&endpoint, &params)
            .map_err(|e| ScraperError::Config(format!("invalid Eventbrite URL '{}': {}", endpoint, e)))
    }
}

impl Default for EventbriteApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for EventbriteApi {
    fn source(&self) -> EventSource {
        EventSource::Eventbrite
    }

    fn validate(&self, options: &ScrapeOptions, has_renderer: bool) -> Result<()> {
        ensure_renderer(self.source(), options, has_renderer)?;
        options.require_api_key(self.source())?;
        let orgs = Self::organization_ids(options);
        let Some(first) = orgs.first() else {
            return Err(ScraperError::Config(format!(
                "eventbrite needs at least one id in query.{}",
                ORGANIZATION_IDS
            )));
        };
        self.events_url(options, first, None).map(|_| ())
    }

    #[instrument(skip(self, options, ctx), fields(source = "eventbrite"))]
    async fn scrape(&self, options: &ScrapeOptions, ctx: &SourceContext) -> Result<ScrapeOutcome> {
        let started = Instant::now();
        let source = self.source();
        let token = options.require_api_key(source)?;
        let auth = format!("Bearer {}", token);
        let headers = [("Authorization", auth.as_str())];
        let mut outcome = ScrapeOutcome::default();
        let mut first_request = true;

        'orgs: for org in Self::organization_ids(options) {
            let mut continuation: Option<String> = None;
            for page in 0..options.max_pages.max(1) {
                if !options.max_events.allows(outcome.fetched) {
                    break 'orgs;
                }
                let url = self.events_url(options, &org, continuation.as_deref())?;
                let body: EventsPage = match ctx.get_json(url.as_str(), &headers).await {
                    Ok(body) => body,
                    Err(e) if first_request => return Err(e),
                    Err(ScraperError::Cancelled) => {
                        outcome.truncated_by_cancel = true;
                        break 'orgs;
                    }
                    Err(e) => {
                        warn!(organization = %org, page, error = %e, "Eventbrite page failed");
                        continue 'orgs;
                    }
                };
                first_request = false;

                debug!(organization = %org, page, count = body.events.len(), "Eventbrite page received");
                for value in body.events {
                    if !options.max_events.allows(outcome.fetched) {
                        break;
                    }
                    match serde_json::from_value::<RawEventbriteEvent>(value) {
                        Ok(raw) => outcome.accept(RawRecord::Eventbrite(raw), Utc::now()),
                        Err(e) => outcome.undecodable(source, &e),
                    }
                }

                match body.pagination {
                    Some(p) if p.has_more_items && p.continuation.is_some() => {
                        continuation = p.continuation;
                    }
                    _ => break,
                }
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
