// Event storage port and the stores the pipeline ships with

pub mod in_memory;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::common::error::Result;
use crate::domain::{CanonicalEvent, EventPatch, NaturalKey, StoredEvent};

pub use in_memory::InMemoryEventStore;
pub use sqlite::SqliteEventStore;

/// Persistent event collection, unique on `(source, sourceId)`.
///
/// Implementations never delete documents. `insert` must fail with
/// `ScraperError::DuplicateKey` when the natural key is already taken.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find_one(&self, key: &NaturalKey) -> Result<Option<StoredEvent>>;

    async fn insert(&self, event: CanonicalEvent) -> Result<StoredEvent>;

    async fn update(&self, id: Uuid, patch: EventPatch) -> Result<StoredEvent>;

    async fn count(&self) -> Result<usize>;
}
