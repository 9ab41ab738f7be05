//! DuckDB-backed persistence for sensor events.
//!
//! The supervisor owns exactly one store. Events are appended in batches and
//! purged wholesale at the start of a new session.

use std::path::Path;

use duckdb::{Connection, params};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::sensor::event::SensorEvent;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] duckdb::Error),
}

pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open the store at `db_path`, or in memory when no path is given.
    pub fn open(db_path: Option<&Path>) -> Result<Self, StoreError> {
        let conn = match db_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_events (
                id VARCHAR PRIMARY KEY,
                container_id VARCHAR NOT NULL,
                image_name VARCHAR NOT NULL,
                output VARCHAR NOT NULL,
                priority VARCHAR NOT NULL,
                rule VARCHAR NOT NULL,
                event_time VARCHAR NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sensor_events_container ON sensor_events(container_id);
            CREATE INDEX IF NOT EXISTS idx_sensor_events_rule ON sensor_events(rule);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Delete every stored event. Session state reset, not an error when the
    /// table is already empty.
    pub fn purge_events(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sensor_events", [])?;
        Ok(())
    }

    /// Insert a batch of events in file order. Ownership of the batch ends
    /// here; the supervisor never reads events back.
    pub fn bulk_insert(&self, events: &[SensorEvent]) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO sensor_events (id, container_id, image_name, output, priority, rule, event_time)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )?;
        for event in events {
            stmt.execute(params![
                Uuid::now_v7().to_string(),
                event.container_id,
                event.image_name,
                event.output,
                event.priority,
                event.rule,
                event.time,
            ])?;
        }
        Ok(())
    }

    pub fn event_count(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sensor_events", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(rule: &str) -> SensorEvent {
        SensorEvent {
            container_id: "abc123".to_string(),
            image_name: "nginx:1.21".to_string(),
            output: "Sensitive file opened for reading".to_string(),
            priority: "WARNING".to_string(),
            rule: rule.to_string(),
            time: "2026-08-06T10:00:00.000000000Z".to_string(),
        }
    }

    #[test]
    fn test_bulk_insert_and_count() {
        let store = EventStore::open(None).expect("Failed to open in-memory store");
        assert_eq!(store.event_count().unwrap(), 0);

        let batch = vec![sample_event("Read sensitive file"), sample_event("Run shell")];
        store.bulk_insert(&batch).expect("Failed to insert batch");
        assert_eq!(store.event_count().unwrap(), 2);
    }

    #[test]
    fn test_purge_resets_state() {
        let store = EventStore::open(None).expect("Failed to open in-memory store");
        store
            .bulk_insert(&[sample_event("Read sensitive file")])
            .unwrap();
        assert_eq!(store.event_count().unwrap(), 1);

        store.purge_events().expect("Failed to purge");
        assert_eq!(store.event_count().unwrap(), 0);

        // Idempotent on an empty table
        store.purge_events().expect("Purge on empty table failed");
        assert_eq!(store.event_count().unwrap(), 0);
    }

    #[test]
    fn test_empty_batch_is_a_noop() {
        let store = EventStore::open(None).expect("Failed to open in-memory store");
        store.bulk_insert(&[]).unwrap();
        assert_eq!(store.event_count().unwrap(), 0);
    }
}
