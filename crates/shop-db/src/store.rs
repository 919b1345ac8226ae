//! Storage backends behind a [`Tx`](crate::Tx).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::DbError;

pub(crate) type Key = (String, String);

/// Staged writes keyed by (collection, id); `None` marks a delete.
pub(crate) type Journal = BTreeMap<Key, Option<Value>>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id         TEXT NOT NULL,
        body       TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );
";

/// Committed documents.
///
/// `Sqlite` keeps one JSON document per row and wraps every unit of work in
/// a `BEGIN IMMEDIATE` transaction. `Memory` keeps nothing across restarts.
#[derive(Debug)]
pub(crate) enum Store {
    Memory(HashMap<String, BTreeMap<String, Value>>),
    Sqlite(Connection),
}

impl Store {
    pub(crate) fn memory() -> Self {
        Store::Memory(HashMap::new())
    }

    pub(crate) fn open_sqlite(path: &Path, busy_timeout: Duration) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened sqlite store");
        Ok(Store::Sqlite(conn))
    }

    /// Start a unit of work on the backend.
    pub(crate) fn begin(&mut self) -> Result<(), DbError> {
        match self {
            Store::Memory(_) => Ok(()),
            Store::Sqlite(conn) => Ok(conn.execute_batch("BEGIN IMMEDIATE")?),
        }
    }

    pub(crate) fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DbError> {
        match self {
            Store::Memory(collections) => Ok(collections
                .get(collection)
                .and_then(|docs| docs.get(id))
                .cloned()),
            Store::Sqlite(conn) => {
                let body: Option<String> = conn
                    .query_row(
                        "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                        params![collection, id],
                        |row| row.get(0),
                    )
                    .optional()?;
                body.map(|b| serde_json::from_str(&b).map_err(DbError::from))
                    .transpose()
            }
        }
    }

    /// Every committed document of a collection, ordered by id.
    pub(crate) fn scan(&self, collection: &str) -> Result<BTreeMap<String, Value>, DbError> {
        match self {
            Store::Memory(collections) => {
                Ok(collections.get(collection).cloned().unwrap_or_default())
            }
            Store::Sqlite(conn) => {
                let mut stmt =
                    conn.prepare_cached("SELECT id, body FROM documents WHERE collection = ?1")?;
                let rows = stmt.query_map(params![collection], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;

                let mut docs = BTreeMap::new();
                for row in rows {
                    let (id, body) = row?;
                    docs.insert(id, serde_json::from_str(&body)?);
                }
                Ok(docs)
            }
        }
    }

    /// Apply a journal and end the unit of work.
    ///
    /// On failure the backend is rolled back and nothing is applied.
    pub(crate) fn commit(&mut self, journal: Journal) -> Result<(), DbError> {
        match self {
            Store::Memory(collections) => {
                for ((collection, id), staged) in journal {
                    let docs = collections.entry(collection).or_default();
                    match staged {
                        Some(doc) => {
                            docs.insert(id, doc);
                        }
                        None => {
                            docs.remove(&id);
                        }
                    }
                }
                Ok(())
            }
            Store::Sqlite(conn) => {
                let applied = write_journal(conn, journal).and_then(|()| {
                    conn.execute_batch("COMMIT")?;
                    Ok(())
                });
                if applied.is_err() {
                    rollback_sqlite(conn);
                }
                applied
            }
        }
    }

    /// End the unit of work without applying anything.
    pub(crate) fn abort(&mut self) {
        if let Store::Sqlite(conn) = self {
            rollback_sqlite(conn);
        }
    }
}

fn write_journal(conn: &Connection, journal: Journal) -> Result<(), DbError> {
    let mut upsert = conn.prepare_cached(
        "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)
         ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body",
    )?;
    let mut delete = conn.prepare_cached("DELETE FROM documents WHERE collection = ?1 AND id = ?2")?;

    for ((collection, id), staged) in journal {
        match staged {
            Some(doc) => {
                upsert.execute(params![collection, id, serde_json::to_string(&doc)?])?;
            }
            None => {
                delete.execute(params![collection, id])?;
            }
        }
    }
    Ok(())
}

fn rollback_sqlite(conn: &Connection) {
    if conn.is_autocommit() {
        return;
    }
    if let Err(err) = conn.execute_batch("ROLLBACK") {
        tracing::error!(error = %err, "sqlite rollback failed");
    }
}
