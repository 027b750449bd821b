// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key-value storage backends for the secure cache.
//
// Schema (SQLite backend):
//   kv_store(
//     key        TEXT PRIMARY KEY,   -- namespaced key, e.g. "redactor_secure_cache_doc-1"
//     value      TEXT NOT NULL,      -- JSON record
//     updated_at TEXT NOT NULL       -- RFC 3339
//   )

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use redactor_core::error::{RedactorError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

/// String-keyed, string-valued storage with prefix operations.
///
/// Every method may fail: a backend that cannot be reached reports
/// `RedactorError::Database`, which callers translate into the error the
/// operation owes its own caller.
pub trait KeyValueStore: Send {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite.
    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;

    /// Returns whether a value was present.
    fn remove_item(&mut self, key: &str) -> Result<bool>;

    /// All keys, sorted.
    fn keys(&self) -> Result<Vec<String>>;

    /// Remove every key. Returns how many were removed.
    fn clear(&mut self) -> Result<usize>;

    /// Keys starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    /// Remove every key starting with `prefix`. Returns how many were removed.
    fn remove_prefix(&mut self, prefix: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.keys_with_prefix(prefix)? {
            if self.remove_item(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS kv_store (
        key        TEXT PRIMARY KEY,
        value      TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );";

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> RedactorError + '_ {
    move |e| RedactorError::Database(format!("{context}: {e}"))
}

/// Durable store backed by a single SQLite table.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively.  In an async context, wrap calls in `tokio::task::spawn_blocking`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the store at `path` with WAL journalling.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err("open"))?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(db_err("WAL pragma"))?;
        debug!(journal_mode = %mode, "journal mode set");
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(db_err("create table"))?;

        info!("key-value store opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (nothing touches disk).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open in-memory"))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(db_err("create table"))?;

        debug!("in-memory key-value store opened");
        Ok(Self { conn })
    }
}

impl KeyValueStore for SqliteStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("get item"))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(db_err("set item"))?;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .map_err(db_err("remove item"))?;
        Ok(rows > 0)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv_store ORDER BY key ASC")
            .map_err(db_err("prepare keys"))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(db_err("query keys"))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(db_err("read key"))?);
        }
        Ok(keys)
    }

    fn clear(&mut self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM kv_store", [])
            .map_err(db_err("clear"))
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        // substr() instead of LIKE so '%' and '_' in ids are literal.
        let mut stmt = self
            .conn
            .prepare(
                "SELECT key FROM kv_store
                 WHERE substr(key, 1, length(?1)) = ?1
                 ORDER BY key ASC",
            )
            .map_err(db_err("prepare prefix keys"))?;
        let rows = stmt
            .query_map(params![prefix], |row| row.get(0))
            .map_err(db_err("query prefix keys"))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(db_err("read key"))?);
        }
        Ok(keys)
    }

    fn remove_prefix(&mut self, prefix: &str) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM kv_store WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )
            .map_err(db_err("remove prefix"))
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-memory store. Used for session-scoped transient state and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<bool> {
        Ok(self.items.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.keys().cloned().collect())
    }

    fn clear(&mut self) -> Result<usize> {
        let removed = self.items.len();
        self.items.clear();
        Ok(removed)
    }
}
