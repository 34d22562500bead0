use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::apis::{ScrapeOptions, ScrapeOutcome, SourceAdapter, SourceContext};
use crate::app::ports::{HttpClientPort, PageRendererPort};
use crate::common::constants::DEFAULT_CONCURRENCY;
use crate::common::error::Result;
use crate::domain::{CanonicalEvent, EventSource, NaturalKey};
use crate::observability::metrics;
use crate::pipeline::ingestion::politeness::{PolitenessConfig, PolitenessController};
use crate::pipeline::processing::dedup::{
    find_duplicates, resolve_merges, BatchEvent, BatchId, DedupConfig,
};
use crate::pipeline::run_stats::{ExclusionRecord, FailureStage, RunStats};
use crate::pipeline::storage::EventStore;
use crate::pipeline::upsert::upsert_event;

/// One source to scrape in a run.
pub struct SourceJob {
    pub adapter: Arc<dyn SourceAdapter>,
    pub options: ScrapeOptions,
    pub politeness: PolitenessConfig,
}

impl SourceJob {
    pub fn source(&self) -> EventSource {
        self.adapter.source()
    }
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Sources scraped at the same time.
    pub concurrency: usize,
    /// Cancels the run once elapsed. Work collected so far is still written.
    pub run_timeout: Option<Duration>,
    pub dedup: DedupConfig,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            run_timeout: None,
            dedup: DedupConfig::default(),
        }
    }
}

/// Drives a run: validate, scrape, deduplicate, upsert.
pub struct IngestionOrchestrator {
    http: Arc<dyn HttpClientPort>,
    renderer: Option<Arc<dyn PageRendererPort>>,
    store: Arc<dyn EventStore>,
    settings: RunSettings,
}

impl IngestionOrchestrator {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        renderer: Option<Arc<dyn PageRendererPort>>,
        store: Arc<dyn EventStore>,
        settings: RunSettings,
    ) -> Self {
        Self {
            http,
            renderer,
            store,
            settings,
        }
    }

    /// Run every job once. Failures are reported in the returned stats, never as an error.
    #[instrument(skip_all, fields(jobs = jobs.len()))]
    pub async fn run(&self, jobs: Vec<SourceJob>, cancel: CancellationToken) -> RunStats {
        let started = Instant::now();
        let mut stats = RunStats::default();

        let mut valid = Vec::with_capacity(jobs.len());
        for job in jobs {
            let source = job.source();
            match job.adapter.validate(&job.options, self.renderer.is_some()) {
                Ok(()) => valid.push(job),
                Err(e) => {
                    warn!(%source, error = %e, "Source failed validation, skipping");
                    metrics::sources::scrape_failed(source, e.kind());
                    stats.record_failure(source, FailureStage::Validate, e.kind(), e.to_string());
                }
            }
        }

        let timer = self.settings.run_timeout.map(|limit| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(timeout_secs = limit.as_secs_f64(), "Run timeout reached, cancelling");
                token.cancel();
            })
        });

        let mut results: Vec<(usize, EventSource, Result<ScrapeOutcome>)> = stream::iter(
            valid
                .into_iter()
                .enumerate()
                .map(|(order, job)| self.scrape_job(order, job, cancel.clone())),
        )
        .buffer_unordered(self.settings.concurrency.max(1))
        .collect()
        .await;

        if let Some(timer) = timer {
            timer.abort();
        }
        stats.cancelled = cancel.is_cancelled();

        // completion order is nondeterministic; the batch is assembled in job order
        results.sort_by_key(|(order, _, _)| *order);
        let mut events = Vec::new();
        for (_, source, result) in results {
            match result {
                Ok(outcome) => {
                    stats.record_outcome(source, &outcome);
                    events.extend(outcome.events);
                }
                Err(e) => {
                    error!(%source, error = %e, "Source scrape failed");
                    metrics::sources::scrape_failed(source, e.kind());
                    stats.record_failure(source, FailureStage::Scrape, e.kind(), e.to_string());
                }
            }
        }

        let events = collapse_repeated_keys(events, &mut stats);
        let survivors = self.deduplicate(events, &mut stats);
        self.persist(survivors, &mut stats).await;

        stats.duration = started.elapsed();
        metrics::run::completed(stats.duration.as_secs_f64(), stats.failed_sources().len());
        info!(
            fetched = stats.fetched,
            normalised = stats.normalised,
            merged = stats.merged,
            inserted = stats.inserted,
            updated = stats.updated,
            unchanged = stats.skipped_unchanged,
            errors = stats.skipped_error,
            failures = stats.failures.len(),
            cancelled = stats.cancelled,
            "Ingestion run complete"
        );
        stats
    }

    async fn scrape_job(
        &self,
        order: usize,
        job: SourceJob,
        cancel: CancellationToken,
    ) -> (usize, EventSource, Result<ScrapeOutcome>) {
        let source = job.source();
        let politeness = job.politeness.with_delay_floor(job.options.detail_fetch_delay);
        let ctx = SourceContext::new(
            self.http.clone(),
            self.renderer.clone(),
            PolitenessController::new(source, politeness, cancel),
        );
        info!(%source, "Scraping source");
        let result = job.adapter.scrape(&job.options, &ctx).await;
        (order, source, result)
    }

    fn deduplicate(&self, events: Vec<CanonicalEvent>, stats: &mut RunStats) -> Vec<CanonicalEvent> {
        let batch = BatchEvent::index(events);
        let pairs = find_duplicates(&batch, &self.settings.dedup);

        let merging = pairs.iter().filter(|p| p.should_merge).count();
        stats.duplicate_pairs_found += merging;
        stats.weak_matches += pairs.len() - merging;

        let merges = resolve_merges(&batch, &pairs);
        let excluded: HashSet<BatchId> = merges.iter().map(|m| m.dropped).collect();
        for merge in merges {
            let kept = batch[merge.kept.0].event.natural_key();
            let dropped = batch[merge.dropped.0].event.natural_key();
            info!(%kept, excluded = %dropped, score = merge.similarity_score, "Merging duplicate");
            stats.record_exclusion(ExclusionRecord {
                excluded: dropped,
                kept,
                score: merge.similarity_score,
                reasons: merge.reasons,
            });
        }

        batch
            .into_iter()
            .filter(|e| !excluded.contains(&e.id))
            .map(|e| e.event)
            .collect()
    }

    async fn persist(&self, events: Vec<CanonicalEvent>, stats: &mut RunStats) {
        let now = Utc::now();
        let mut write_errors: BTreeMap<EventSource, (usize, String)> = BTreeMap::new();
        for event in events {
            let source = event.source;
            let key = event.natural_key();
            match upsert_event(self.store.as_ref(), event, now).await {
                Ok(change) => stats.record_change(source, change),
                Err(e) => {
                    error!(%key, error = %e, "Failed to store event");
                    metrics::upsert::outcome(source, "error");
                    stats.record_write_error(source);
                    write_errors
                        .entry(source)
                        .or_insert_with(|| (0, e.to_string()))
                        .0 += 1;
                }
            }
        }
        for (source, (count, first)) in write_errors {
            stats.record_failure(
                source,
                FailureStage::Persist,
                "storage",
                format!("{} event(s) could not be stored; first error: {}", count, first),
            );
        }
    }
}

/// Keep the first event per natural key. Sources that list a show twice in one run would
/// otherwise race themselves on insert.
fn collapse_repeated_keys(events: Vec<CanonicalEvent>, stats: &mut RunStats) -> Vec<CanonicalEvent> {
    let mut seen: HashSet<NaturalKey> = HashSet::new();
    events
        .into_iter()
        .filter(|event| {
            let fresh = seen.insert(event.natural_key());
            if !fresh {
                stats.collapsed_in_batch += 1;
            }
            fresh
        })
        .collect()
}
