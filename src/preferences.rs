/// preferences.rs – Small persistent key/value store for UI selections.
///
/// Values are stored as JSON text in a single SQLite table so a selection
/// made in one session (asset class, theme) is restored in the next.
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS preferences (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";

pub struct PreferenceStore {
    conn: Mutex<Connection>,
}

impl PreferenceStore {
    /// Open (or create) the store at *path* and apply the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("opening preferences database")?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory preferences")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("applying schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }

    /// Stored value for *key*, or *default* when the key is missing, the
    /// stored text is not valid JSON for `T`, or the read fails.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let raw = match self.get_raw(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(e) => {
                warn!("Reading preference '{key}' failed: {e:#}");
                return default;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Stored preference '{key}' is unreadable ({e}) – using default");
                default
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).context("encoding preference")?;
        self.set_raw(key, &raw)
    }

    /// Read-modify-write: apply *f* to the current value (or *default*) and
    /// persist the result, which is also returned.
    pub fn update<T, F>(&self, key: &str, default: T, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let next = f(self.get(key, default));
        self.set(key, &next)?;
        Ok(next)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM preferences WHERE key = ?1", params![key])?;
            Ok(n > 0)
        })
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(anyhow::Error::from)
        })
    }

    pub(crate) fn set_raw(&self, key: &str, raw: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO preferences (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value      = excluded.value,
                    updated_at = excluded.updated_at",
                params![key, raw, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_returns_default() {
        let store = PreferenceStore::open_in_memory().unwrap();
        assert_eq!(store.get("theme", "dark".to_string()), "dark");
    }

    #[test]
    fn unparsable_value_returns_default() {
        let store = PreferenceStore::open_in_memory().unwrap();
        store.set_raw("count", "{not json").unwrap();
        assert_eq!(store.get("count", 7u32), 7);
    }

    #[test]
    fn update_applies_function() {
        let store = PreferenceStore::open_in_memory().unwrap();
        store.set("count", &1u32).unwrap();
        let next = store.update("count", 0u32, |n| n + 1).unwrap();
        assert_eq!(next, 2);
        assert_eq!(store.get("count", 0u32), 2);
    }

    #[test]
    fn remove_reports_presence() {
        let store = PreferenceStore::open_in_memory().unwrap();
        store.set("k", &true).unwrap();
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
    }
}
