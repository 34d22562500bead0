use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::EventStore;
use crate::common::error::{Result, ScraperError};
use crate::domain::{CanonicalEvent, EventPatch, NaturalKey, StoredEvent};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Event store kept in a SQLite database, one JSON document per row.
///
/// Each write goes straight to the database, so stores opened on the same file (from
/// one process or several) see each other's rows, and the `(source, source_id)` index
/// keeps natural keys unique across all of them.
#[derive(Debug)]
pub struct SqliteEventStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

fn load(conn: &Connection, id: Uuid) -> Result<Option<StoredEvent>> {
    let mut stmt = conn.prepare("SELECT document FROM events WHERE id = ?1")?;
    let mut rows = stmt.query(params![id.to_string()])?;
    if let Some(row) = rows.next()? {
        let raw: String = row.get(0)?;
        Ok(Some(serde_json::from_str(&raw)?))
    } else {
        Ok(None)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

impl SqliteEventStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS events (
                id         TEXT PRIMARY KEY,
                source     TEXT NOT NULL,
                source_id  TEXT NOT NULL,
                document   TEXT NOT NULL,
                UNIQUE (source, source_id)
            );
            "#,
        )?;
        let store = Self {
            path,
            conn: Mutex::new(conn),
        };
        info!(path = %store.path.display(), documents = store.row_count()?, "Opened event store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScraperError::storage("database connection lock poisoned"))
    }

    fn row_count(&self) -> Result<usize> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Every stored document in natural-key order.
    pub fn all(&self) -> Result<Vec<StoredEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT document FROM events ORDER BY source, source_id")?;
        let mut rows = stmt.query([])?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            docs.push(serde_json::from_str(&raw)?);
        }
        Ok(docs)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn find_one(&self, key: &NaturalKey) -> Result<Option<StoredEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT document FROM events WHERE source = ?1 AND source_id = ?2")?;
        let mut rows = stmt.query(params![key.source.as_str(), key.source_id])?;
        if let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            Ok(Some(serde_json::from_str(&raw)?))
        } else {
            Ok(None)
        }
    }

    async fn insert(&self, event: CanonicalEvent) -> Result<StoredEvent> {
        let stored = StoredEvent {
            id: Uuid::new_v4(),
            event,
        };
        let key = stored.event.natural_key();
        let document = serde_json::to_string(&stored)?;
        let inserted = self.lock()?.execute(
            "INSERT INTO events (id, source, source_id, document) VALUES (?1, ?2, ?3, ?4)",
            params![stored.id.to_string(), key.source.as_str(), key.source_id, document],
        );
        match inserted {
            Ok(_) => {
                debug!("Created event: {} with id {}", stored.event.title, stored.id);
                Ok(stored)
            }
            Err(e) if is_unique_violation(&e) => Err(ScraperError::DuplicateKey(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, id: Uuid, patch: EventPatch) -> Result<StoredEvent> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut stored =
            load(&tx, id)?.ok_or_else(|| ScraperError::storage(format!("no event with id {}", id)))?;
        patch.apply(&mut stored.event);
        tx.execute(
            "UPDATE events SET document = ?2 WHERE id = ?1",
            params![id.to_string(), serde_json::to_string(&stored)?],
        )?;
        tx.commit()?;
        debug!("Updated event: {} ({})", stored.event.title, id);
        Ok(stored)
    }

    async fn count(&self) -> Result<usize> {
        self.row_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventSource;
    use crate::pipeline::storage::in_memory::test_support::stored_event;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalogue").join("events.db");

        let store = SqliteEventStore::open(&path).unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        let hamlet = store
            .insert(stored_event(EventSource::Marriner, "hamlet", "Hamlet"))
            .await
            .unwrap();
        store
            .insert(stored_event(EventSource::Feverup, "154321", "Candlelight"))
            .await
            .unwrap();
        drop(store);

        let reopened = SqliteEventStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        let found = reopened
            .find_one(&NaturalKey::new(EventSource::Marriner, "hamlet"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, hamlet);
        let keys: Vec<String> = reopened
            .all()
            .unwrap()
            .iter()
            .map(|d| d.event.natural_key().to_string())
            .collect();
        assert_eq!(keys, vec!["feverup:154321", "marriner:hamlet"]);
    }

    #[tokio::test]
    async fn test_stores_sharing_a_file_keep_each_others_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.db");
        let first = SqliteEventStore::open(&path).unwrap();
        let second = SqliteEventStore::open(&path).unwrap();

        first
            .insert(stored_event(EventSource::Marriner, "six", "SIX"))
            .await
            .unwrap();
        second
            .insert(stored_event(EventSource::Eventbrite, "42", "Night Market"))
            .await
            .unwrap();

        let err = second
            .insert(stored_event(EventSource::Marriner, "six", "SIX the Musical"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());

        assert_eq!(first.count().await.unwrap(), 2);
        assert!(first
            .find_one(&NaturalKey::new(EventSource::Eventbrite, "42"))
            .await
            .unwrap()
            .is_some());
        drop(first);
        drop(second);
        assert_eq!(SqliteEventStore::open(&path).unwrap().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_rewrites_the_document() {
        let dir = tempdir().unwrap();
        let store = SqliteEventStore::open(dir.path().join("events.db")).unwrap();
        let stored = store
            .insert(stored_event(EventSource::Ticketmaster, "G5v", "Hamlet"))
            .await
            .unwrap();

        let mut seen_again = stored_event(EventSource::Ticketmaster, "G5v", "Hamlet (final week)");
        seen_again.scraped_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let updated = store
            .update(stored.id, EventPatch::from_event(&seen_again, seen_again.scraped_at))
            .await
            .unwrap();
        assert_eq!(updated.event.title, "Hamlet (final week)");
        assert_eq!(updated.event.scraped_at, stored.event.scraped_at);

        let found = store
            .find_one(&NaturalKey::new(EventSource::Ticketmaster, "G5v"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, updated);
    }

    #[tokio::test]
    async fn test_update_of_unknown_id_is_a_storage_error() {
        let dir = tempdir().unwrap();
        let store = SqliteEventStore::open(dir.path().join("events.db")).unwrap();
        let patch = EventPatch::from_event(
            &stored_event(EventSource::Whatson, "x", "X"),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        );
        let err = store.update(Uuid::new_v4(), patch).await.unwrap_err();
        assert_eq!(err.kind(), "storage");
    }

    #[tokio::test]
    async fn test_rows_hold_camel_case_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.db");
        let store = SqliteEventStore::open(&path).unwrap();
        store
            .insert(stored_event(EventSource::Eventbrite, "42", "Night Market"))
            .await
            .unwrap();

        let conn = Connection::open(&path).unwrap();
        let raw: String = conn
            .query_row("SELECT document FROM events WHERE source_id = '42'", [], |row| row.get(0))
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["source"], "eventbrite");
        assert_eq!(doc["sourceId"], "42");
        assert!(doc["startDate"].is_string());
        assert!(doc["id"].is_string());
    }
}
