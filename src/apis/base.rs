use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::app::ports::{HttpClientPort, PageRendererPort};
use crate::common::constants::{DEFAULT_MAX_EVENTS, DEFAULT_MAX_PAGES};
use crate::common::error::{Result, ScraperError};
use crate::domain::{CanonicalEvent, EventSource};
use crate::observability::metrics;
use crate::pipeline::ingestion::politeness::PolitenessController;
use crate::pipeline::processing::normalize::{normalize, RawRecord};

/// Upper bound on how many items an adapter takes. `"infinity"` in config means no bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cap {
    Limited(usize),
    Unbounded,
}

impl Cap {
    pub fn limit(&self) -> Option<usize> {
        match self {
            Cap::Limited(n) => Some(*n),
            Cap::Unbounded => None,
        }
    }

    /// Whether one more item may be taken when `taken` already have been.
    pub fn allows(&self, taken: usize) -> bool {
        match self {
            Cap::Limited(n) => taken < *n,
            Cap::Unbounded => true,
        }
    }

    pub fn min(self, other: Cap) -> Cap {
        match (self, other) {
            (Cap::Limited(a), Cap::Limited(b)) => Cap::Limited(a.min(b)),
            (Cap::Limited(a), Cap::Unbounded) | (Cap::Unbounded, Cap::Limited(a)) => {
                Cap::Limited(a)
            }
            (Cap::Unbounded, Cap::Unbounded) => Cap::Unbounded,
        }
    }
}

impl<'de> Deserialize<'de> for Cap {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum CapRepr {
            Count(usize),
            Word(String),
        }

        match CapRepr::deserialize(deserializer)? {
            CapRepr::Count(n) => Ok(Cap::Limited(n)),
            CapRepr::Word(word) => match word.trim().to_ascii_lowercase().as_str() {
                "infinity" | "inf" | "unbounded" | "unlimited" => Ok(Cap::Unbounded),
                other => other
                    .parse::<usize>()
                    .map(Cap::Limited)
                    .map_err(|_| serde::de::Error::custom(format!("invalid cap '{}'", word))),
            },
        }
    }
}

/// How an adapter fetches HTML pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    Direct,
    /// Through the headless-browser render service, for pages built client-side.
    Rendered,
}

/// Per-source scrape options, resolved from `[sources.<name>]` config.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub max_events: Cap,
    pub detail_fetch_delay: Duration,
    pub use_headless: bool,
    pub max_shows: Cap,
    pub max_detail_fetches: Cap,
    pub max_pages: usize,
    pub api_key: Option<String>,
    pub listing_url: Option<String>,
    pub query: BTreeMap<String, String>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            max_events: Cap::Limited(DEFAULT_MAX_EVENTS),
            detail_fetch_delay: Duration::ZERO,
            use_headless: false,
            max_shows: Cap::Unbounded,
            max_detail_fetches: Cap::Unbounded,
            max_pages: DEFAULT_MAX_PAGES,
            api_key: None,
            listing_url: None,
            query: BTreeMap::new(),
        }
    }
}

impl ScrapeOptions {
    pub fn strategy(&self) -> FetchStrategy {
        if self.use_headless {
            FetchStrategy::Rendered
        } else {
            FetchStrategy::Direct
        }
    }

    pub fn require_api_key(&self, source: EventSource) -> Result<&str> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ScraperError::Config(format!(
                "{} requires an API credential but none is configured",
                source
            ))),
        }
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// What one adapter run produced.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub events: Vec<CanonicalEvent>,
    /// Raw records obtained from the source, whether or not they normalized.
    pub fetched: usize,
    pub mapping_errors: usize,
    pub detail_errors: usize,
    pub truncated_by_cancel: bool,
}

impl ScrapeOutcome {
    /// Normalize one raw record, keeping the event or counting the mapping failure.
    pub fn accept(&mut self, record: RawRecord, scraped_at: DateTime<Utc>) {
        self.fetched += 1;
        let source = record.source();
        match normalize(&record, scraped_at) {
            Ok(event) => {
                metrics::normalize::record_normalized(source);
                self.events.push(event);
            }
            Err(e) => {
                warn!(
                    source = %source,
                    record = %record.id_hint(),
                    error = %e,
                    "Dropping record that failed to normalize"
                );
                metrics::normalize::mapping_error(source, e.field);
                self.mapping_errors += 1;
            }
        }
    }

    /// Count a record whose payload could not even be decoded as the source's raw shape.
    pub fn undecodable(&mut self, source: EventSource, error: &serde_json::Error) {
        self.fetched += 1;
        self.mapping_errors += 1;
        warn!(source = %source, error = %error, "Dropping record with an unexpected shape");
        metrics::normalize::mapping_error(source, "payload");
    }

    pub fn detail_failed(&mut self, source: EventSource) {
        metrics::sources::detail_skipped(source);
        self.detail_errors += 1;
    }
}

/// Everything an adapter needs to talk to its source.
pub struct SourceContext {
    http: Arc<dyn HttpClientPort>,
    renderer: Option<Arc<dyn PageRendererPort>>,
    politeness: PolitenessController,
}

impl SourceContext {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        renderer: Option<Arc<dyn PageRendererPort>>,
        politeness: PolitenessController,
    ) -> Self {
        Self {
            http,
            renderer,
            politeness,
        }
    }

    pub fn source(&self) -> EventSource {
        self.politeness.source()
    }

    pub fn is_cancelled(&self) -> bool {
        self.politeness.is_cancelled()
    }

    pub fn politeness(&self) -> &PolitenessController {
        &self.politeness
    }

    /// Paced fetch of a page body. Non-2xx responses become `ScraperError::Fetch`.
    pub async fn get_text(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        strategy: FetchStrategy,
    ) -> Result<String> {
        let source = self.source();
        let result = self
            .politeness
            .run(|| async {
                match strategy {
                    FetchStrategy::Direct => self.http.get(url, headers).await,
                    FetchStrategy::Rendered => match &self.renderer {
                        Some(renderer) => renderer.render(url).await,
                        None => Err(ScraperError::Config(format!(
                            "{} needs a render service for {}",
                            source, url
                        ))),
                    },
                }
            })
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if !matches!(e, ScraperError::Cancelled) {
                    metrics::sources::fetch_failed(source);
                }
                return Err(e);
            }
        };

        metrics::sources::fetch_completed(source, response.status);
        if !response.is_success() {
            return Err(ScraperError::fetch(
                url,
                Some(response.status),
                format!("HTTP {}", response.status),
            ));
        }
        Ok(response.body)
    }

    pub async fn get_page(&self, url: &str, strategy: FetchStrategy) -> Result<String> {
        self.get_text(url, &[], strategy).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T> {
        let body = self.get_text(url, headers, FetchStrategy::Direct).await?;
        serde_json::from_str(&body)
            .map_err(|e| ScraperError::fetch(url, None, format!("invalid JSON payload: {}", e)))
    }
}

/// Headless fetching needs a render service to send pages to.
pub fn ensure_renderer(source: EventSource, options: &ScrapeOptions, has_renderer: bool) -> Result<()> {
    if options.use_headless && !has_renderer {
        return Err(ScraperError::Config(format!(
            "{} is configured for headless fetching but no render service is set",
            source
        )));
    }
    Ok(())
}

/// Produces canonical events from one external source.
///
/// Whether an adapter calls a JSON API or drives the render service is its own business;
/// the orchestrator only sees this trait.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> EventSource;

    /// Whether pages for this source need client-side rendering unless configured otherwise.
    fn prefers_headless(&self) -> bool {
        false
    }

    /// Check credentials and required options. Runs before any network call.
    fn validate(&self, options: &ScrapeOptions, has_renderer: bool) -> Result<()> {
        ensure_renderer(self.source(), options, has_renderer)
    }

    async fn scrape(&self, options: &ScrapeOptions, ctx: &SourceContext) -> Result<ScrapeOutcome>;
}
