use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::common::error::{Result, ScraperError};
use crate::domain::{CanonicalEvent, EventPatch};
use crate::observability::metrics;
use crate::pipeline::storage::EventStore;

/// What a single upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    NoChange,
    /// Another writer took the natural key between our lookup and insert.
    Skip,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Updated => "updated",
            ChangeType::NoChange => "no_change",
            ChangeType::Skip => "skip",
        }
    }
}

/// Fields whose change warrants a write. Everything else rides along on the patch.
pub fn event_needs_update(existing: &CanonicalEvent, incoming: &CanonicalEvent) -> bool {
    existing.title != incoming.title
        || existing.start_date != incoming.start_date
        || existing.description != incoming.description
        || existing.price_min != incoming.price_min
        || existing.price_max != incoming.price_max
        || existing.is_free != incoming.is_free
}

/// Reconcile one scraped event with the store, keyed by its natural key.
///
/// A duplicate-key failure on insert is reported as `ChangeType::Skip`; every other
/// storage failure is returned to the caller.
#[instrument(skip(store, event), fields(key = %event.natural_key()))]
pub async fn upsert_event(
    store: &dyn EventStore,
    event: CanonicalEvent,
    now: DateTime<Utc>,
) -> Result<ChangeType> {
    let source = event.source;
    let change = match store.find_one(&event.natural_key()).await? {
        Some(existing) if event_needs_update(&existing.event, &event) => {
            store.update(existing.id, EventPatch::from_event(&event, now)).await?;
            info!("Updated existing event: {} ({})", event.title, existing.id);
            ChangeType::Updated
        }
        Some(existing) => {
            debug!("No changes needed for event: {} ({})", event.title, existing.id);
            ChangeType::NoChange
        }
        None => {
            let title = event.title.clone();
            match store.insert(event).await {
                Ok(stored) => {
                    info!("Created new event: {} ({}) on {}", title, stored.id, stored.event.start_date);
                    ChangeType::Created
                }
                Err(ScraperError::DuplicateKey(key)) => {
                    warn!(%key, "Natural key already stored, skipping insert");
                    ChangeType::Skip
                }
                Err(e) => return Err(e),
            }
        }
    };
    metrics::upsert::outcome(source, change.as_str());
    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventSource, NaturalKey, StoredEvent};
    use crate::pipeline::storage::in_memory::test_support::stored_event;
    use crate::pipeline::storage::InMemoryEventStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_insert_then_no_change_then_update() {
        let store = InMemoryEventStore::new();
        let event = stored_event(EventSource::Marriner, "hamlet", "Hamlet");
        let first_run = event.last_updated;

        assert_eq!(upsert_event(&store, event.clone(), first_run).await.unwrap(), ChangeType::Created);
        assert_eq!(
            upsert_event(&store, event.clone(), first_run + Duration::hours(1)).await.unwrap(),
            ChangeType::NoChange
        );

        let mut repriced = event.clone();
        repriced.price_min = Some(39.0);
        let later = first_run + Duration::days(1);
        assert_eq!(upsert_event(&store, repriced, later).await.unwrap(), ChangeType::Updated);

        let stored = store.find_one(&event.natural_key()).await.unwrap().unwrap();
        assert_eq!(stored.event.price_min, Some(39.0));
        assert_eq!(stored.event.last_updated, later);
        assert_eq!(stored.event.scraped_at, event.scraped_at);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[test]
    fn test_only_tracked_fields_trigger_updates() {
        let event = stored_event(EventSource::Whatson, "night-market", "Night Market");
        let mut cosmetic = event.clone();
        cosmetic.image_url = Some("https://img.test/new.jpg".into());
        cosmetic.subcategories.push("food".into());
        assert!(!event_needs_update(&event, &cosmetic));

        let mut free = event.clone();
        free.is_free = true;
        assert!(event_needs_update(&event, &free));

        let mut moved = event.clone();
        moved.start_date += Duration::hours(2);
        assert!(event_needs_update(&event, &moved));
    }

    /// Store that always loses the insert race.
    struct RacingStore;

    #[async_trait]
    impl EventStore for RacingStore {
        async fn find_one(&self, _key: &NaturalKey) -> Result<Option<StoredEvent>> {
            Ok(None)
        }

        async fn insert(&self, event: CanonicalEvent) -> Result<StoredEvent> {
            Err(ScraperError::DuplicateKey(event.natural_key()))
        }

        async fn update(&self, _id: Uuid, _patch: EventPatch) -> Result<StoredEvent> {
            Err(ScraperError::storage("unreachable"))
        }

        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_lost_insert_race_is_a_skip() {
        let event = stored_event(EventSource::Feverup, "154321", "Candlelight");
        let change = upsert_event(&RacingStore, event.clone(), event.last_updated).await.unwrap();
        assert_eq!(change, ChangeType::Skip);
    }
}
