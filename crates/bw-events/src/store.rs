use crate::ids::EventId;
use crate::types::{Flat, Hook};
use rusqlite::types::Type;
use rusqlite::{Connection, params};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    version TEXT NOT NULL,
    parent_id TEXT,
    hook_json TEXT NOT NULL,
    scope TEXT NOT NULL,
    action TEXT NOT NULL,
    source TEXT NOT NULL,
    at TEXT NOT NULL,
    subject_name TEXT NOT NULL,
    subject_id TEXT NOT NULL,
    org_id TEXT NOT NULL,
    team_id TEXT,
    user_id TEXT,
    payload_kind TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS events_parent ON events(parent_id);
";

/// Append-only sqlite log of flattened events.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    pub fn new(conn: Connection) -> Result<Self, EventStoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, EventStoreError> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Returns the row sequence assigned to the event. Re-appending an id
    /// already in the log is a no-op returning the existing sequence.
    pub fn append(&self, event: &Flat) -> Result<i64, EventStoreError> {
        let hook = serde_json::to_string(&event.hook)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO events (id, version, parent_id, hook_json, scope, action, source, at, subject_name, subject_id, org_id, team_id, user_id, payload_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                event.id.as_str(),
                event.version,
                event.parent_id.as_ref().map(EventId::as_str),
                hook,
                event.scope.as_str(),
                event.action.as_str(),
                event.source,
                event.timestamp.to_rfc3339(),
                event.subject_name,
                event.subject_id.to_string(),
                event.org_id.to_string(),
                event.team_id.map(|id| id.to_string()),
                event.user_id.map(|id| id.to_string()),
                event.payload_kind.to_string(),
            ],
        )?;
        let seq = self.conn.query_row(
            "SELECT seq FROM events WHERE id = ?1",
            params![event.id.as_str()],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    pub fn list(&self, after: Option<i64>, limit: Option<u32>) -> Result<Vec<Flat>, EventStoreError> {
        let mut sql = String::from(
            "SELECT id, version, parent_id, hook_json, scope, action, source, at, subject_name, subject_id, org_id, team_id, user_id, payload_kind FROM events",
        );
        let mut params_vec: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(after_seq) = after {
            sql.push_str(" WHERE seq > ?");
            params_vec.push(after_seq.into());
        }
        sql.push_str(" ORDER BY seq ASC");
        if let Some(limit_val) = limit {
            sql.push_str(" LIMIT ?");
            params_vec.push(i64::from(limit_val).into());
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params_vec), row_to_flat)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Events whose `parent_id` is `parent`, in append order.
    pub fn children(&self, parent: &EventId) -> Result<Vec<Flat>, EventStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, version, parent_id, hook_json, scope, action, source, at, subject_name, subject_id, org_id, team_id, user_id, payload_kind FROM events WHERE parent_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![parent.as_str()], row_to_flat)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}

fn conversion<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_uuid(column: usize, value: &str) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value).map_err(|err| conversion(column, err))
}

fn row_to_flat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Flat> {
    let id: String = row.get(0)?;
    let parent_id: Option<String> = row.get(2)?;
    let hook: String = row.get(3)?;
    let scope: String = row.get(4)?;
    let action: String = row.get(5)?;
    let at: String = row.get(7)?;
    let subject_id: String = row.get(9)?;
    let org_id: String = row.get(10)?;
    let team_id: Option<String> = row.get(11)?;
    let user_id: Option<String> = row.get(12)?;
    let payload_kind: String = row.get(13)?;

    Ok(Flat {
        version: row.get(1)?,
        id: EventId::new(id).map_err(|err| conversion(0, err))?,
        parent_id: parent_id
            .map(EventId::new)
            .transpose()
            .map_err(|err| conversion(2, err))?,
        hook: serde_json::from_str::<Hook>(&hook).map_err(|err| conversion(3, err))?,
        scope: scope.parse().map_err(|err| conversion(4, err))?,
        action: action.parse().map_err(|err| conversion(5, err))?,
        source: row.get(6)?,
        timestamp: chrono::DateTime::parse_from_rfc3339(&at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|err| conversion(7, err))?,
        subject_name: row.get(8)?,
        subject_id: parse_uuid(9, &subject_id)?,
        org_id: parse_uuid(10, &org_id)?,
        team_id: team_id.as_deref().map(|v| parse_uuid(11, v)).transpose()?,
        user_id: user_id.as_deref().map(|v| parse_uuid(12, v)).transpose()?,
        payload_kind: serde_json::from_value(serde_json::Value::String(payload_kind))
            .map_err(|err| conversion(13, err))?,
    })
}
