//! Metric names and emit helpers. The library only talks to the `metrics` facade;
//! whichever binary embeds it decides on an exporter.

/// Per-source fetch and scrape metrics
pub mod sources {
    use crate::domain::EventSource;
    use metrics::{counter, histogram};

    pub fn fetch_completed(source: EventSource, status: u16) {
        counter!(
            "event_catalogue_fetches_total",
            "source" => source.as_str(),
            "status" => status.to_string()
        )
        .increment(1);
    }

    pub fn fetch_failed(source: EventSource) {
        counter!("event_catalogue_fetch_errors_total", "source" => source.as_str()).increment(1);
    }

    pub fn detail_skipped(source: EventSource) {
        counter!("event_catalogue_detail_skips_total", "source" => source.as_str()).increment(1);
    }

    pub fn politeness_wait(source: EventSource, secs: f64) {
        histogram!("event_catalogue_politeness_wait_seconds", "source" => source.as_str())
            .record(secs);
    }

    pub fn scrape_finished(source: EventSource, fetched: usize, duration_secs: f64) {
        histogram!("event_catalogue_scrape_duration_seconds", "source" => source.as_str())
            .record(duration_secs);
        histogram!("event_catalogue_raw_records_per_run", "source" => source.as_str())
            .record(fetched as f64);
    }

    pub fn scrape_failed(source: EventSource, kind: &'static str) {
        counter!(
            "event_catalogue_source_failures_total",
            "source" => source.as_str(),
            "kind" => kind
        )
        .increment(1);
    }
}

/// Normalization metrics
pub mod normalize {
    use crate::domain::EventSource;
    use metrics::counter;

    pub fn record_normalized(source: EventSource) {
        counter!("event_catalogue_normalized_total", "source" => source.as_str()).increment(1);
    }

    pub fn mapping_error(source: EventSource, field: &'static str) {
        counter!(
            "event_catalogue_mapping_errors_total",
            "source" => source.as_str(),
            "field" => field
        )
        .increment(1);
    }
}

/// Deduplication metrics
pub mod dedup {
    use metrics::{counter, histogram};

    pub fn pass_completed(batch_size: usize, merge_pairs: usize, weak_pairs: usize) {
        histogram!("event_catalogue_dedup_batch_size").record(batch_size as f64);
        counter!("event_catalogue_dedup_merge_pairs_total").increment(merge_pairs as u64);
        counter!("event_catalogue_dedup_weak_pairs_total").increment(weak_pairs as u64);
    }

    pub fn similarity_recorded(score: f64) {
        histogram!("event_catalogue_dedup_similarity").record(score);
    }
}

/// Upsert outcome metrics
pub mod upsert {
    use crate::domain::EventSource;
    use metrics::counter;

    pub fn outcome(source: EventSource, outcome: &'static str) {
        counter!(
            "event_catalogue_upserts_total",
            "source" => source.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

/// Whole-run metrics
pub mod run {
    use metrics::{counter, histogram};

    pub fn completed(duration_secs: f64, failed_sources: usize) {
        counter!("event_catalogue_runs_total").increment(1);
        histogram!("event_catalogue_run_duration_seconds").record(duration_secs);
        counter!("event_catalogue_failed_sources_total").increment(failed_sources as u64);
    }
}
