//! SQLite thread store implementation.

use crate::{Error, Event, EventKind, Result, Role, ThreadId};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use std::path::Path;

/// Summary of one thread's history.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
}

/// SQLite-backed, append-only thread history.
pub struct ThreadStore {
    conn: Connection,
}

impl ThreadStore {
    /// Open or create a thread store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory thread store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                thread_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_thread
                ON events(thread_id, seq);
            "#,
        )?;
        Ok(())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (id, thread_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.thread_id.as_str(),
                event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Save a conversation message on a thread.
    pub fn save_message(
        &self,
        thread_id: &ThreadId,
        role: Role,
        content: impl Into<String>,
    ) -> Result<()> {
        self.append(&Event::message(thread_id.clone(), role, content))
    }

    /// Load all events for a thread in append order.
    pub fn load_thread(&self, thread_id: &ThreadId) -> Result<Vec<Event>> {
        self.load_events(thread_id, None)
    }

    /// Load events for a thread, optionally filtered by kind name
    /// (`message`, `tool_call`, `tool_result`, `run_end`).
    pub fn load_events(&self, thread_id: &ThreadId, kind: Option<&str>) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, thread_id, timestamp, data FROM events
             WHERE thread_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY seq",
        )?;

        let rows = stmt
            .query_map(params![thread_id.as_str(), kind], raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawEvent::into_event).collect()
    }

    /// List all threads, most recently started first.
    pub fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT thread_id, MIN(timestamp), MAX(timestamp),
                    SUM(CASE WHEN kind = 'message' THEN 1 ELSE 0 END)
             FROM events
             GROUP BY thread_id
             ORDER BY MIN(timestamp) DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, started, last, count)| {
                Ok(ThreadSummary {
                    started_at: parse_timestamp(&id, &started)?,
                    last_activity: parse_timestamp(&id, &last)?,
                    message_count: usize::try_from(count).unwrap_or_default(),
                    id: ThreadId(id),
                })
            })
            .collect()
    }
}

struct RawEvent {
    id: String,
    thread_id: String,
    timestamp: String,
    data: String,
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        timestamp: row.get(2)?,
        data: row.get(3)?,
    })
}

impl RawEvent {
    fn into_event(self) -> Result<Event> {
        let id = self.id.parse().map_err(|e| Error::Corrupt {
            id: self.id.clone(),
            reason: format!("bad uuid: {e}"),
        })?;
        let timestamp = parse_timestamp(&self.id, &self.timestamp)?;
        let kind: EventKind = serde_json::from_str(&self.data)?;
        Ok(Event {
            id,
            thread_id: ThreadId(self.thread_id),
            timestamp,
            kind,
        })
    }
}

fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp {raw:?}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(id: &str) -> ThreadId {
        ThreadId::from(id)
    }

    #[test]
    fn append_and_load_in_order() {
        let store = ThreadStore::in_memory().unwrap();
        let t = thread("thread_1");

        store.save_message(&t, Role::User, "What's the weather?").unwrap();
        store
            .append(&Event::new(
                t.clone(),
                EventKind::ToolCall {
                    call_id: "call_1".into(),
                    name: "fetch_current_temperature".into(),
                    arguments: String::new(),
                },
            ))
            .unwrap();
        store
            .save_message(&t, Role::Assistant, "It is 32 degrees Celsius.")
            .unwrap();

        let events = store.load_thread(&t).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0].kind,
            EventKind::Message { role: Role::User, .. }
        ));
        assert!(matches!(&events[1].kind, EventKind::ToolCall { .. }));
        assert!(matches!(
            &events[2].kind,
            EventKind::Message { role: Role::Assistant, content }
                if content == "It is 32 degrees Celsius."
        ));
    }

    #[test]
    fn threads_are_isolated() {
        let store = ThreadStore::in_memory().unwrap();
        store.save_message(&thread("a"), Role::User, "one").unwrap();
        store.save_message(&thread("b"), Role::User, "two").unwrap();

        let a = store.load_thread(&thread("a")).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].thread_id, thread("a"));
        assert!(store.load_thread(&thread("missing")).unwrap().is_empty());
    }

    #[test]
    fn load_events_filters_by_kind() {
        let store = ThreadStore::in_memory().unwrap();
        let t = thread("thread_1");
        store.save_message(&t, Role::User, "hi").unwrap();
        store
            .append(&Event::new(
                t.clone(),
                EventKind::RunEnd {
                    run_id: Some("run_1".into()),
                    status: "completed".into(),
                    detail: None,
                },
            ))
            .unwrap();

        let ends = store.load_events(&t, Some("run_end")).unwrap();
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].kind.name(), "run_end");
        assert_eq!(store.load_events(&t, None).unwrap().len(), 2);
    }

    #[test]
    fn list_threads_counts_messages_only() {
        let store = ThreadStore::in_memory().unwrap();
        let t = thread("thread_1");
        store.save_message(&t, Role::User, "hi").unwrap();
        store
            .append(&Event::new(
                t.clone(),
                EventKind::ToolResult {
                    call_id: "call_1".into(),
                    name: "noop".into(),
                    output: String::new(),
                    is_error: false,
                },
            ))
            .unwrap();
        store.save_message(&t, Role::Assistant, "hello").unwrap();

        let threads = store.list_threads().unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].id, t);
        assert_eq!(threads[0].message_count, 2);
        assert!(threads[0].started_at <= threads[0].last_activity);
    }

    #[test]
    fn open_persists_across_connections() {
        let path = std::env::temp_dir().join(format!("hawser-{}.db", uuid::Uuid::new_v4()));
        {
            let store = ThreadStore::open(&path).unwrap();
            store.save_message(&thread("t"), Role::User, "persisted").unwrap();
        }
        let store = ThreadStore::open(&path).unwrap();
        assert_eq!(store.load_thread(&thread("t")).unwrap().len(), 1);
        let _ = std::fs::remove_file(&path);
    }
}
