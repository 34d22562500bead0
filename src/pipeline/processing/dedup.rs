//! Cross-source duplicate detection over one ingestion batch.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use super::similarity::{title_similarity, venue_similarity};
use crate::common::constants::DEFAULT_TIMEZONE;
use crate::domain::CanonicalEvent;
use crate::observability::metrics;

/// Scoring weights and thresholds. Lives in `[dedup]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub title_weight: f64,
    pub date_weight: f64,
    pub venue_weight: f64,
    pub merge_threshold: f64,
    /// Pairs scoring at least this much but below `merge_threshold` are reported, not merged.
    pub report_threshold: f64,
    /// Start dates further apart than this many local days never match.
    pub date_tolerance_days: i64,
    /// Component score at which a `Title` or `Venue` reason is recorded.
    pub reason_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_weight: 0.5,
            date_weight: 0.3,
            venue_weight: 0.2,
            merge_threshold: 0.8,
            report_threshold: 0.5,
            date_tolerance_days: 1,
            reason_threshold: 0.8,
        }
    }
}

/// Position of an event in the batch handed to [`find_duplicates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BatchId(pub usize);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct BatchEvent {
    pub id: BatchId,
    pub event: CanonicalEvent,
}

impl BatchEvent {
    pub fn index(events: Vec<CanonicalEvent>) -> Vec<BatchEvent> {
        events
            .into_iter()
            .enumerate()
            .map(|(i, event)| BatchEvent {
                id: BatchId(i),
                event,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchReason {
    Title,
    Date,
    Venue,
}

/// Two batch events that look like the same real-world event. `event1_id` always
/// refers to the event with the smaller natural key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicatePair {
    pub event1_id: BatchId,
    pub event2_id: BatchId,
    pub similarity_score: f64,
    pub should_merge: bool,
    pub reasons: BTreeSet<MatchReason>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    pub title: f64,
    pub date: f64,
    pub venue: f64,
    pub composite: f64,
}

fn date_proximity(a: &CanonicalEvent, b: &CanonicalEvent, tolerance_days: i64) -> Option<f64> {
    let day_a = a.start_date.with_timezone(&DEFAULT_TIMEZONE).date_naive();
    let day_b = b.start_date.with_timezone(&DEFAULT_TIMEZONE).date_naive();
    match (day_a - day_b).num_days().abs() {
        0 => Some(1.0),
        d if d <= tolerance_days => Some(0.5),
        _ => None,
    }
}

/// Weighted similarity of two events, or `None` when their dates rule a match out.
pub fn score_pair(a: &CanonicalEvent, b: &CanonicalEvent, config: &DedupConfig) -> Option<MatchScore> {
    let date = date_proximity(a, b, config.date_tolerance_days)?;
    let title = title_similarity(&a.title, &b.title);
    let venue = venue_similarity(&a.venue.name, &b.venue.name);
    let weights = config.title_weight + config.date_weight + config.venue_weight;
    if weights <= 0.0 {
        return None;
    }
    let composite = (config.title_weight * title
        + config.date_weight * date
        + config.venue_weight * venue)
        / weights;
    Some(MatchScore {
        title,
        date,
        venue,
        composite: composite.clamp(0.0, 1.0),
    })
}

fn reasons_for(score: &MatchScore, config: &DedupConfig) -> BTreeSet<MatchReason> {
    let mut reasons = BTreeSet::new();
    if score.title >= config.reason_threshold {
        reasons.insert(MatchReason::Title);
    }
    if score.date >= 1.0 {
        reasons.insert(MatchReason::Date);
    }
    if score.venue >= config.reason_threshold {
        reasons.insert(MatchReason::Venue);
    }
    reasons
}

/// Compare every cross-source pair in the batch.
///
/// Pairs come back strongest first, ties ordered by the natural keys involved, so the
/// result does not depend on how the batch was assembled beyond the ids themselves.
pub fn find_duplicates(batch: &[BatchEvent], config: &DedupConfig) -> Vec<DuplicatePair> {
    let mut pairs = Vec::new();

    for (i, left) in batch.iter().enumerate() {
        for right in &batch[i + 1..] {
            if left.event.source == right.event.source {
                continue;
            }
            let (first, second) = if left.event.natural_key() <= right.event.natural_key() {
                (left, right)
            } else {
                (right, left)
            };
            let Some(score) = score_pair(&first.event, &second.event, config) else {
                continue;
            };
            metrics::dedup::similarity_recorded(score.composite);
            if score.composite < config.report_threshold {
                continue;
            }
            let should_merge = score.composite >= config.merge_threshold;
            debug!(
                event1 = %first.event.natural_key(),
                event2 = %second.event.natural_key(),
                score = score.composite,
                should_merge,
                "Possible duplicate"
            );
            pairs.push(DuplicatePair {
                event1_id: first.id,
                event2_id: second.id,
                similarity_score: score.composite,
                should_merge,
                reasons: reasons_for(&score, config),
            });
        }
    }

    let key_of = |id: BatchId| {
        batch
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.event.natural_key())
    };
    pairs.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| key_of(a.event1_id).cmp(&key_of(b.event1_id)))
            .then_with(|| key_of(a.event2_id).cmp(&key_of(b.event2_id)))
    });

    let merges = pairs.iter().filter(|p| p.should_merge).count();
    metrics::dedup::pass_completed(batch.len(), merges, pairs.len() - merges);
    pairs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryChoice {
    Event1,
    Event2,
}

fn richness(event: &CanonicalEvent) -> usize {
    [
        event.price_min.is_some(),
        event.price_max.is_some(),
        event.image_url.is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count()
}

fn real_description_len(event: &CanonicalEvent) -> usize {
    if event.has_real_description() {
        event.description.chars().count()
    } else {
        0
    }
}

/// `Less` when `a` should survive over `b`.
fn preference(a: &CanonicalEvent, b: &CanonicalEvent) -> Ordering {
    richness(b)
        .cmp(&richness(a))
        .then_with(|| real_description_len(b).cmp(&real_description_len(a)))
        .then_with(|| a.source.priority().cmp(&b.source.priority()))
        .then_with(|| a.natural_key().cmp(&b.natural_key()))
}

/// Pick which of two duplicates survives: the richer record, then the longer real
/// description, then the more authoritative source, then the smaller natural key.
pub fn select_primary_event(event1: &CanonicalEvent, event2: &CanonicalEvent) -> PrimaryChoice {
    match preference(event1, event2) {
        Ordering::Greater => PrimaryChoice::Event2,
        Ordering::Less | Ordering::Equal => PrimaryChoice::Event1,
    }
}

/// One batch event dropped in favour of a duplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub dropped: BatchId,
    pub kept: BatchId,
    pub similarity_score: f64,
    pub reasons: BTreeSet<MatchReason>,
}

/// Apply every merge pair: each one drops its less preferred event.
///
/// Chains collapse the same way whatever order `pairs` arrive in, and the most
/// preferred event of a linked group is never dropped. A dropped event is reported
/// once, against the strongest pair that dropped it. Weak pairs are ignored.
pub fn resolve_merges(batch: &[BatchEvent], pairs: &[DuplicatePair]) -> Vec<Merge> {
    let events: BTreeMap<BatchId, &CanonicalEvent> = batch.iter().map(|e| (e.id, &e.event)).collect();
    let mut merges: BTreeMap<BatchId, Merge> = BTreeMap::new();

    for pair in pairs.iter().filter(|p| p.should_merge) {
        let (Some(first), Some(second)) = (events.get(&pair.event1_id), events.get(&pair.event2_id)) else {
            continue;
        };
        let (kept, dropped) = match select_primary_event(first, second) {
            PrimaryChoice::Event1 => (pair.event1_id, pair.event2_id),
            PrimaryChoice::Event2 => (pair.event2_id, pair.event1_id),
        };
        let candidate = Merge {
            dropped,
            kept,
            similarity_score: pair.similarity_score,
            reasons: pair.reasons.clone(),
        };
        let stronger = |current: &Merge| match candidate.similarity_score.partial_cmp(&current.similarity_score) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => events[&candidate.kept].natural_key() < events[&current.kept].natural_key(),
            _ => false,
        };
        if merges.get(&dropped).map_or(true, stronger) {
            merges.insert(dropped, candidate);
        }
    }

    merges.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, EventSource, Venue};
    use chrono::{DateTime, TimeZone, Utc};

    fn event(source: EventSource, id: &str, title: &str, start: DateTime<Utc>, venue: &str) -> CanonicalEvent {
        CanonicalEvent {
            title: title.to_string(),
            description: crate::common::constants::DESCRIPTION_PLACEHOLDER.to_string(),
            category: Category::Theatre,
            subcategories: Vec::new(),
            start_date: start,
            end_date: None,
            venue: Venue::named(venue),
            price_min: None,
            price_max: None,
            is_free: true,
            booking_url: format!("https://{}.test/{}", source, id),
            image_url: None,
            source,
            source_id: id.to_string(),
            scraped_at: start,
            last_updated: start,
        }
    }

    fn nov_first() -> DateTime<Utc> {
        // 2025-11-01 00:00 in Melbourne
        Utc.with_ymd_and_hms(2025, 10, 31, 13, 0, 0).unwrap()
    }

    fn hamlet_pair() -> (CanonicalEvent, CanonicalEvent) {
        (
            event(EventSource::Marriner, "hamlet", "Hamlet", nov_first(), "Her Majesty's Theatre"),
            event(
                EventSource::Ticketmaster,
                "G5vHamlet",
                "Hamlet — Marriner Theatres",
                nov_first(),
                "Her Majestys Theatre",
            ),
        )
    }

    #[test]
    fn test_hamlet_is_merged() {
        let (marriner, ticketmaster) = hamlet_pair();
        let batch = BatchEvent::index(vec![marriner, ticketmaster]);
        let pairs = find_duplicates(&batch, &DedupConfig::default());

        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert!(pair.should_merge);
        assert!(pair.similarity_score >= 0.99);
        assert_eq!(
            pair.reasons,
            BTreeSet::from([MatchReason::Title, MatchReason::Date, MatchReason::Venue])
        );
        // marriner:hamlet < ticketmaster:G5vHamlet
        assert_eq!(pair.event1_id, BatchId(0));

        let (e1, e2) = hamlet_pair();
        assert_eq!(select_primary_event(&e1, &e2), PrimaryChoice::Event1);
    }

    #[test]
    fn test_pairs_do_not_depend_on_batch_order() {
        let (marriner, ticketmaster) = hamlet_pair();
        let forward = find_duplicates(
            &BatchEvent::index(vec![marriner.clone(), ticketmaster.clone()]),
            &DedupConfig::default(),
        );
        let backward = find_duplicates(
            &BatchEvent::index(vec![ticketmaster, marriner]),
            &DedupConfig::default(),
        );
        assert_eq!(forward.len(), backward.len());
        assert_eq!(forward[0].similarity_score, backward[0].similarity_score);
        assert_eq!(forward[0].reasons, backward[0].reasons);
        assert_eq!(forward[0].event1_id, BatchId(0));
        assert_eq!(backward[0].event1_id, BatchId(1));
    }

    #[test]
    fn test_same_source_and_distant_dates_never_pair() {
        let (marriner, _) = hamlet_pair();
        let mut again = marriner.clone();
        again.source_id = "hamlet-matinee".into();
        assert!(find_duplicates(&BatchEvent::index(vec![marriner.clone(), again]), &DedupConfig::default()).is_empty());

        let (_, mut later) = hamlet_pair();
        later.start_date = nov_first() + chrono::Duration::days(3);
        assert!(find_duplicates(&BatchEvent::index(vec![marriner, later]), &DedupConfig::default()).is_empty());
    }

    #[test]
    fn test_weak_match_is_reported_not_merged() {
        let a = event(EventSource::Whatson, "jazz", "Jazz in the Park", nov_first(), "Fitzroy Gardens");
        let b = event(
            EventSource::Eventbrite,
            "9911",
            "Jazz in the Gardens",
            nov_first() + chrono::Duration::days(1),
            "Fitzroy Gardens",
        );
        let pairs = find_duplicates(&BatchEvent::index(vec![a, b]), &DedupConfig::default());
        assert_eq!(pairs.len(), 1);
        assert!(!pairs[0].should_merge);
        assert!(!pairs[0].reasons.contains(&MatchReason::Date));
        assert!(pairs[0].reasons.contains(&MatchReason::Venue));
    }

    #[test]
    fn test_primary_selection_order() {
        let (mut marriner, mut ticketmaster) = hamlet_pair();

        // richness beats source priority
        ticketmaster.price_min = Some(59.0);
        ticketmaster.price_max = Some(149.0);
        assert_eq!(select_primary_event(&marriner, &ticketmaster), PrimaryChoice::Event2);
        assert_eq!(select_primary_event(&ticketmaster, &marriner), PrimaryChoice::Event1);

        // then a real description
        marriner.price_min = Some(59.0);
        marriner.price_max = Some(149.0);
        ticketmaster.description = "Shakespeare's tragedy in a new staging.".into();
        assert_eq!(select_primary_event(&marriner, &ticketmaster), PrimaryChoice::Event2);

        // then source priority
        marriner.description = ticketmaster.description.clone();
        assert_eq!(select_primary_event(&marriner, &ticketmaster), PrimaryChoice::Event1);
        assert_eq!(select_primary_event(&ticketmaster, &marriner), PrimaryChoice::Event2);
    }

    /// Marriner "Hamlet" is the richest; Eventbrite "Encore" only matches the
    /// Ticketmaster listing that names both.
    fn encore_chain() -> Vec<CanonicalEvent> {
        let mut marriner = event(EventSource::Marriner, "hamlet", "Hamlet", nov_first(), "Comedy Theatre");
        marriner.price_min = Some(79.0);
        marriner.price_max = Some(149.0);
        marriner.image_url = Some("https://marriner.test/hamlet.jpg".into());
        let mut ticketmaster =
            event(EventSource::Ticketmaster, "G5vEncore", "Hamlet — Encore", nov_first(), "Comedy Theatre");
        ticketmaster.price_min = Some(59.0);
        ticketmaster.price_max = Some(149.0);
        let eventbrite = event(EventSource::Eventbrite, "7788", "Encore", nov_first(), "Comedy Theatre");
        vec![eventbrite, ticketmaster, marriner]
    }

    fn dropped(merges: &[Merge]) -> BTreeSet<BatchId> {
        merges.iter().map(|m| m.dropped).collect()
    }

    #[test]
    fn test_chained_merges_drop_every_loser() {
        let batch = BatchEvent::index(encore_chain());
        let pairs = find_duplicates(&batch, &DedupConfig::default());
        let merging: Vec<_> = pairs.iter().filter(|p| p.should_merge).collect();
        assert_eq!(merging.len(), 2);
        // the marriner/ticketmaster pair is the stronger one
        assert!(merging[0].similarity_score > merging[1].similarity_score);

        let merges = resolve_merges(&batch, &pairs);
        assert_eq!(dropped(&merges), BTreeSet::from([BatchId(0), BatchId(1)]));
        assert!(merges.iter().all(|m| m.dropped != BatchId(2)));

        let ticketmaster = merges.iter().find(|m| m.dropped == BatchId(1)).unwrap();
        assert_eq!(ticketmaster.kept, BatchId(2));
        let eventbrite = merges.iter().find(|m| m.dropped == BatchId(0)).unwrap();
        assert_eq!(eventbrite.kept, BatchId(1));
    }

    #[test]
    fn test_merge_resolution_ignores_pair_order() {
        let batch = BatchEvent::index(encore_chain());
        let pairs = find_duplicates(&batch, &DedupConfig::default());
        let mut reversed = pairs.clone();
        reversed.reverse();

        let forward = resolve_merges(&batch, &pairs);
        let backward = resolve_merges(&batch, &reversed);
        assert_eq!(forward, backward);
        assert_eq!(dropped(&forward), BTreeSet::from([BatchId(0), BatchId(1)]));
    }

    #[test]
    fn test_weak_pairs_drop_nothing() {
        let a = event(EventSource::Whatson, "jazz", "Jazz in the Park", nov_first(), "Fitzroy Gardens");
        let b = event(
            EventSource::Eventbrite,
            "9911",
            "Jazz in the Gardens",
            nov_first() + chrono::Duration::days(1),
            "Fitzroy Gardens",
        );
        let batch = BatchEvent::index(vec![a, b]);
        let pairs = find_duplicates(&batch, &DedupConfig::default());
        assert_eq!(pairs.len(), 1);
        assert!(resolve_merges(&batch, &pairs).is_empty());
    }

    #[test]
    fn test_series_with_shared_prefix_is_not_merged() {
        let a = event(
            EventSource::Feverup,
            "154321",
            "Candlelight: Vivaldi's Four Seasons",
            nov_first(),
            "St Michael's Uniting Church",
        );
        let b = event(
            EventSource::Eventbrite,
            "5521",
            "Candlelight: A Tribute to Coldplay",
            nov_first(),
            "St Michael's Uniting Church",
        );
        let batch = BatchEvent::index(vec![a, b]);
        let pairs = find_duplicates(&batch, &DedupConfig::default());
        assert!(pairs.iter().all(|p| !p.should_merge));
        assert!(resolve_merges(&batch, &pairs).is_empty());
    }

    #[test]
    fn test_primary_selection_is_deterministic() {
        let (a, b) = hamlet_pair();
        let first = select_primary_event(&a, &b);
        for _ in 0..100 {
            assert_eq!(select_primary_event(&a, &b), first);
        }
    }
}
