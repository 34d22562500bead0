use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use crate::apis::ScrapeOutcome;
use crate::domain::{EventSource, NaturalKey};
use crate::pipeline::processing::dedup::MatchReason;
use crate::pipeline::upsert::ChangeType;

/// Where in the run a source gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Validate,
    Scrape,
    Persist,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub source: EventSource,
    pub stage: FailureStage,
    pub kind: &'static str,
    pub message: String,
}

/// An event dropped by deduplication in favour of `kept`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExclusionRecord {
    pub excluded: NaturalKey,
    pub kept: NaturalKey,
    pub score: f64,
    pub reasons: BTreeSet<MatchReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub fetched: usize,
    pub normalised: usize,
    pub mapping_errors: usize,
    pub detail_errors: usize,
    pub truncated_by_cancel: bool,
    pub merged: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped_unchanged: usize,
    pub skipped_error: usize,
}

/// Counters and records for one ingestion run. Totals are sums over `sources`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub fetched: usize,
    pub normalised: usize,
    pub mapping_errors: usize,
    pub detail_errors: usize,
    pub collapsed_in_batch: usize,
    /// Pairs at or above the merge threshold.
    pub duplicate_pairs_found: usize,
    pub weak_matches: usize,
    pub merged: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped_unchanged: usize,
    pub skipped_error: usize,
    pub duplicate_key_skips: usize,
    pub duration: Duration,
    pub cancelled: bool,
    pub sources: BTreeMap<EventSource, SourceSummary>,
    pub failures: Vec<SourceFailure>,
    pub exclusions: Vec<ExclusionRecord>,
}

impl RunStats {
    fn summary_mut(&mut self, source: EventSource) -> &mut SourceSummary {
        self.sources.entry(source).or_default()
    }

    pub fn record_outcome(&mut self, source: EventSource, outcome: &ScrapeOutcome) {
        self.fetched += outcome.fetched;
        self.normalised += outcome.events.len();
        self.mapping_errors += outcome.mapping_errors;
        self.detail_errors += outcome.detail_errors;
        let summary = self.summary_mut(source);
        summary.fetched += outcome.fetched;
        summary.normalised += outcome.events.len();
        summary.mapping_errors += outcome.mapping_errors;
        summary.detail_errors += outcome.detail_errors;
        summary.truncated_by_cancel |= outcome.truncated_by_cancel;
    }

    pub fn record_failure(
        &mut self,
        source: EventSource,
        stage: FailureStage,
        kind: &'static str,
        message: impl Into<String>,
    ) {
        self.summary_mut(source);
        self.failures.push(SourceFailure {
            source,
            stage,
            kind,
            message: message.into(),
        });
    }

    pub fn record_exclusion(&mut self, record: ExclusionRecord) {
        self.merged += 1;
        self.summary_mut(record.excluded.source).merged += 1;
        self.exclusions.push(record);
    }

    pub fn record_change(&mut self, source: EventSource, change: ChangeType) {
        let summary = self.summary_mut(source);
        match change {
            ChangeType::Created => summary.inserted += 1,
            ChangeType::Updated => summary.updated += 1,
            ChangeType::NoChange => summary.skipped_unchanged += 1,
            ChangeType::Skip => summary.skipped_error += 1,
        }
        match change {
            ChangeType::Created => self.inserted += 1,
            ChangeType::Updated => self.updated += 1,
            ChangeType::NoChange => self.skipped_unchanged += 1,
            ChangeType::Skip => {
                self.skipped_error += 1;
                self.duplicate_key_skips += 1;
            }
        }
    }

    pub fn record_write_error(&mut self, source: EventSource) {
        self.skipped_error += 1;
        self.summary_mut(source).skipped_error += 1;
    }

    /// Sources with at least one recorded failure.
    pub fn failed_sources(&self) -> BTreeSet<EventSource> {
        self.failures.iter().map(|f| f.source).collect()
    }

    /// True when every source in `requested` failed outright. An empty request never fails.
    pub fn all_failed(&self, requested: &[EventSource]) -> bool {
        let failed = self.failed_sources();
        !requested.is_empty() && requested.iter().all(|s| failed.contains(s))
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run finished in {:.1}s{}",
            self.duration.as_secs_f64(),
            if self.cancelled { " (cancelled)" } else { "" }
        )?;
        writeln!(
            f,
            "  fetched {} | normalised {} | mapping errors {} | detail errors {}",
            self.fetched, self.normalised, self.mapping_errors, self.detail_errors
        )?;
        writeln!(
            f,
            "  duplicates {} (weak {}) | merged {} | collapsed {}",
            self.duplicate_pairs_found, self.weak_matches, self.merged, self.collapsed_in_batch
        )?;
        writeln!(
            f,
            "  inserted {} | updated {} | unchanged {} | errors {} (duplicate keys {})",
            self.inserted, self.updated, self.skipped_unchanged, self.skipped_error, self.duplicate_key_skips
        )?;
        for (source, s) in &self.sources {
            writeln!(
                f,
                "  {:<13} fetched {:>4} normalised {:>4} merged {:>3} inserted {:>4} updated {:>4}",
                source.as_str(),
                s.fetched,
                s.normalised,
                s.merged,
                s.inserted,
                s.updated
            )?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  FAILED {} at {:?} ({}): {}",
                failure.source, failure.stage, failure.kind, failure.message
            )?;
        }
        Ok(())
    }
}
