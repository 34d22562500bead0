use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::EventStore;
use crate::common::error::{Result, ScraperError};
use crate::domain::{CanonicalEvent, EventPatch, NaturalKey, StoredEvent};

#[derive(Debug, Default)]
pub(crate) struct EventTable {
    pub(crate) documents: HashMap<Uuid, StoredEvent>,
    pub(crate) keys: HashMap<NaturalKey, Uuid>,
}

impl EventTable {
    pub(crate) fn find_one(&self, key: &NaturalKey) -> Option<StoredEvent> {
        self.keys
            .get(key)
            .and_then(|id| self.documents.get(id))
            .cloned()
    }

    pub(crate) fn insert(&mut self, event: CanonicalEvent) -> Result<StoredEvent> {
        let key = event.natural_key();
        if self.keys.contains_key(&key) {
            return Err(ScraperError::DuplicateKey(key));
        }
        let stored = StoredEvent {
            id: Uuid::new_v4(),
            event,
        };
        self.keys.insert(key, stored.id);
        self.documents.insert(stored.id, stored.clone());
        Ok(stored)
    }

    pub(crate) fn update(&mut self, id: Uuid, patch: EventPatch) -> Result<StoredEvent> {
        let doc = self
            .documents
            .get_mut(&id)
            .ok_or_else(|| ScraperError::storage(format!("no event with id {}", id)))?;
        patch.apply(&mut doc.event);
        Ok(doc.clone())
    }

    /// Documents in natural-key order.
    pub(crate) fn sorted(&self) -> Vec<&StoredEvent> {
        let mut docs: Vec<&StoredEvent> = self.documents.values().collect();
        docs.sort_by(|a, b| a.event.natural_key().cmp(&b.event.natural_key()));
        docs
    }
}

/// In-memory event store for development and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    table: Arc<Mutex<EventTable>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, EventTable>> {
        self.table
            .lock()
            .map_err(|_| ScraperError::storage("event table lock poisoned"))
    }

    /// Snapshot of every stored document in natural-key order.
    pub fn all(&self) -> Result<Vec<StoredEvent>> {
        Ok(self.lock()?.sorted().into_iter().cloned().collect())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn find_one(&self, key: &NaturalKey) -> Result<Option<StoredEvent>> {
        Ok(self.lock()?.find_one(key))
    }

    async fn insert(&self, event: CanonicalEvent) -> Result<StoredEvent> {
        let stored = self.lock()?.insert(event)?;
        debug!("Created event: {} with id {}", stored.event.title, stored.id);
        Ok(stored)
    }

    async fn update(&self, id: Uuid, patch: EventPatch) -> Result<StoredEvent> {
        let stored = self.lock()?.update(id, patch)?;
        debug!("Updated event: {} ({})", stored.event.title, id);
        Ok(stored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.lock()?.documents.len())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::common::constants::DESCRIPTION_PLACEHOLDER;
    use crate::domain::{CanonicalEvent, Category, EventSource, Venue};
    use chrono::{TimeZone, Utc};

    pub fn stored_event(source: EventSource, id: &str, title: &str) -> CanonicalEvent {
        let seen = Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap();
        CanonicalEvent {
            title: title.to_string(),
            description: DESCRIPTION_PLACEHOLDER.to_string(),
            category: Category::Music,
            subcategories: vec!["rock".to_string()],
            start_date: Utc.with_ymd_and_hms(2025, 11, 1, 9, 0, 0).unwrap(),
            end_date: None,
            venue: Venue::named("Forum Melbourne"),
            price_min: Some(49.0),
            price_max: Some(89.0),
            is_free: false,
            booking_url: format!("https://{}.test/{}", source, id),
            image_url: None,
            source,
            source_id: id.to_string(),
            scraped_at: seen,
            last_updated: seen,
        }
    }
}
