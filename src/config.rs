use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::apis::{create_adapter, Cap, ScrapeOptions};
use crate::common::constants::*;
use crate::common::error::{Result, ScraperError};
use crate::domain::EventSource;
use crate::pipeline::ingestion::politeness::PolitenessConfig;
use crate::pipeline::processing::dedup::DedupConfig;
use crate::pipeline::{RunSettings, SourceJob};

/// Whole-run settings. Lives in `[run]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub concurrency: usize,
    pub request_timeout_secs: u64,
    /// No limit when absent.
    pub run_timeout_secs: Option<u64>,
    pub user_agent: String,
    /// Headless render service. Sources that need one fail validation without it.
    pub render_endpoint: Option<String>,
    pub render_token_env: Option<String>,
    pub store_path: String,
    pub log_dir: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            run_timeout_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            render_endpoint: None,
            render_token_env: None,
            store_path: "data/events.db".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

impl RunConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn render_token(&self) -> Option<String> {
        self.render_token_env.as_deref().and_then(env_value)
    }
}

/// One `[sources.<name>]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    pub max_events: Option<Cap>,
    pub detail_fetch_delay_ms: u64,
    /// Falls back to the adapter's preference when a render service is configured.
    pub use_headless: Option<bool>,
    pub max_shows: Option<Cap>,
    pub max_detail_fetches: Option<Cap>,
    pub max_pages: Option<usize>,
    /// Environment variable holding the credential.
    pub api_key_env: Option<String>,
    pub listing_url: Option<String>,
    pub query: BTreeMap<String, String>,
    pub politeness: PolitenessConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_events: None,
            detail_fetch_delay_ms: 0,
            use_headless: None,
            max_shows: None,
            max_detail_fetches: None,
            max_pages: None,
            api_key_env: None,
            listing_url: None,
            query: BTreeMap::new(),
            politeness: PolitenessConfig::default(),
        }
    }
}

fn default_key_env(source: EventSource) -> Option<&'static str> {
    match source {
        EventSource::Ticketmaster => Some(TICKETMASTER_API_KEY_ENV),
        EventSource::Eventbrite => Some(EVENTBRITE_TOKEN_ENV),
        _ => None,
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl SourceConfig {
    /// Resolve scrape options, reading credentials through `env`.
    pub fn scrape_options(
        &self,
        source: EventSource,
        prefers_headless: bool,
        has_renderer: bool,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> ScrapeOptions {
        let defaults = ScrapeOptions::default();
        let key_env = self.api_key_env.as_deref().or(default_key_env(source));
        let use_headless = match self.use_headless {
            Some(explicit) => explicit,
            None if prefers_headless && !has_renderer => {
                warn!(%source, "No render service configured, fetching pages directly");
                false
            }
            None => prefers_headless,
        };
        ScrapeOptions {
            max_events: self.max_events.unwrap_or(defaults.max_events),
            detail_fetch_delay: Duration::from_millis(self.detail_fetch_delay_ms),
            use_headless,
            max_shows: self.max_shows.unwrap_or(defaults.max_shows),
            max_detail_fetches: self.max_detail_fetches.unwrap_or(defaults.max_detail_fetches),
            max_pages: self.max_pages.unwrap_or(defaults.max_pages),
            api_key: key_env.and_then(|name| env(name)),
            listing_url: self.listing_url.clone(),
            query: self.query.clone(),
        }
    }
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub dedup: DedupConfig,
    sources: BTreeMap<String, SourceConfig>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        for name in self.sources.keys() {
            name.parse::<EventSource>()?;
        }
        if self.run.concurrency == 0 {
            return Err(ScraperError::Config("run.concurrency must be at least 1".into()));
        }
        let d = &self.dedup;
        if !(0.0..=1.0).contains(&d.merge_threshold) || !(0.0..=1.0).contains(&d.report_threshold) {
            return Err(ScraperError::Config("dedup thresholds must lie in [0, 1]".into()));
        }
        if d.report_threshold > d.merge_threshold {
            return Err(ScraperError::Config(
                "dedup.report_threshold cannot exceed dedup.merge_threshold".into(),
            ));
        }
        if d.title_weight < 0.0 || d.date_weight < 0.0 || d.venue_weight < 0.0 {
            return Err(ScraperError::Config("dedup weights cannot be negative".into()));
        }
        Ok(())
    }

    /// Settings for `source`, defaults when it has no table.
    pub fn source(&self, source: EventSource) -> SourceConfig {
        self.sources
            .iter()
            .find(|(name, _)| name.parse::<EventSource>().ok() == Some(source))
            .map(|(_, cfg)| cfg.clone())
            .unwrap_or_default()
    }

    /// Enabled sources. With no `[sources]` tables at all, every source is enabled.
    pub fn enabled_sources(&self) -> Vec<EventSource> {
        EventSource::ALL
            .into_iter()
            .filter(|s| self.source(*s).enabled)
            .filter(|s| {
                self.sources.is_empty()
                    || self
                        .sources
                        .keys()
                        .any(|name| name.parse::<EventSource>().ok() == Some(*s))
            })
            .collect()
    }

    pub fn has_renderer(&self) -> bool {
        self.run
            .render_endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }

    pub fn source_jobs(&self, sources: &[EventSource]) -> Vec<SourceJob> {
        self.source_jobs_with_env(sources, &env_value)
    }

    pub fn source_jobs_with_env(
        &self,
        sources: &[EventSource],
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Vec<SourceJob> {
        sources
            .iter()
            .map(|&source| {
                let adapter = create_adapter(source);
                let cfg = self.source(source);
                let options =
                    cfg.scrape_options(source, adapter.prefers_headless(), self.has_renderer(), env);
                SourceJob {
                    adapter,
                    options,
                    politeness: cfg.politeness,
                }
            })
            .collect()
    }

    /// `timeout_override` (seconds) replaces `run.run_timeout_secs` when given.
    pub fn run_settings(&self, timeout_override: Option<u64>) -> RunSettings {
        RunSettings {
            concurrency: self.run.concurrency,
            run_timeout: timeout_override
                .or(self.run.run_timeout_secs)
                .map(Duration::from_secs),
            dedup: self.dedup.clone(),
        }
    }
}
