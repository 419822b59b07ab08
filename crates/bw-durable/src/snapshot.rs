use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::identity::Identity;

/// Externalized state of one instance at the moment it continued as new or
/// stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub identity: Identity,
    pub workflow: String,
    pub incarnation: u32,
    pub state: serde_json::Value,
    pub at: DateTime<Utc>,
}

pub trait SnapshotStore: Send + Sync {
    fn save(&self, record: &SnapshotRecord) -> Result<(), SnapshotError>;
    fn load(&self, identity: &Identity) -> Result<Option<SnapshotRecord>, SnapshotError>;
}

#[derive(Default)]
pub struct MemorySnapshots {
    records: Mutex<HashMap<Identity, SnapshotRecord>>,
}

impl MemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshots {
    fn save(&self, record: &SnapshotRecord) -> Result<(), SnapshotError> {
        let mut records = self.records.lock().map_err(|_| SnapshotError::Poisoned)?;
        records.insert(record.identity.clone(), record.clone());
        Ok(())
    }

    fn load(&self, identity: &Identity) -> Result<Option<SnapshotRecord>, SnapshotError> {
        let records = self.records.lock().map_err(|_| SnapshotError::Poisoned)?;
        Ok(records.get(identity).cloned())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS snapshots (
    identity TEXT PRIMARY KEY,
    workflow TEXT NOT NULL,
    incarnation INTEGER NOT NULL,
    state_json TEXT NOT NULL,
    at TEXT NOT NULL
);
";

/// Latest snapshot per identity in a sqlite table.
pub struct SqliteSnapshots {
    conn: Mutex<Connection>,
}

impl SqliteSnapshots {
    pub fn new(conn: Connection) -> Result<Self, SnapshotError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: &std::path::Path) -> Result<Self, SnapshotError> {
        Self::new(Connection::open(path)?)
    }
}

impl SnapshotStore for SqliteSnapshots {
    fn save(&self, record: &SnapshotRecord) -> Result<(), SnapshotError> {
        let conn = self.conn.lock().map_err(|_| SnapshotError::Poisoned)?;
        conn.execute(
            "INSERT INTO snapshots (identity, workflow, incarnation, state_json, at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(identity) DO UPDATE SET workflow = excluded.workflow, incarnation = excluded.incarnation, state_json = excluded.state_json, at = excluded.at",
            params![
                record.identity.as_str(),
                record.workflow,
                record.incarnation,
                serde_json::to_string(&record.state)?,
                record.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load(&self, identity: &Identity) -> Result<Option<SnapshotRecord>, SnapshotError> {
        let conn = self.conn.lock().map_err(|_| SnapshotError::Poisoned)?;
        let row = conn
            .query_row(
                "SELECT workflow, incarnation, state_json, at FROM snapshots WHERE identity = ?1",
                params![identity.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((workflow, incarnation, state, at)) = row else {
            return Ok(None);
        };
        let at = DateTime::parse_from_rfc3339(&at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })?;
        Ok(Some(SnapshotRecord {
            identity: identity.clone(),
            workflow,
            incarnation,
            state: serde_json::from_str(&state)?,
            at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(incarnation: u32) -> SnapshotRecord {
        SnapshotRecord {
            identity: Identity::repo("bw", "acme", "widgets", 1),
            workflow: "repo".to_string(),
            incarnation,
            state: serde_json::json!({ "triggers": { "feature": "evt_1" } }),
            at: Utc::now(),
        }
    }

    fn exercise(store: &dyn SnapshotStore) {
        let identity = Identity::repo("bw", "acme", "widgets", 1);
        assert!(store.load(&identity).unwrap().is_none());
        store.save(&record(1)).unwrap();
        store.save(&record(2)).unwrap();
        let loaded = store.load(&identity).unwrap().unwrap();
        assert_eq!(loaded.incarnation, 2);
        assert_eq!(loaded.state["triggers"]["feature"], "evt_1");
        assert!(store.load(&identity.trunk()).unwrap().is_none());
    }

    #[test]
    fn memory_store_keeps_latest() {
        exercise(&MemorySnapshots::new());
    }

    #[test]
    fn sqlite_store_keeps_latest() {
        let store = SqliteSnapshots::new(Connection::open_in_memory().unwrap()).unwrap();
        exercise(&store);
    }
}
