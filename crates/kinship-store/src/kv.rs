//! Key-value access to durable storage.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

/// Minimal durable string storage consumed by the session core.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!(key, "stored value");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let affected = self
            .conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        if affected > 0 {
            tracing::debug!(key, "removed value");
        }
        Ok(())
    }
}

/// Volatile store for tests and sessions that must not touch disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &mut dyn KeyValueStore) {
        assert_eq!(store.get("selectedProfile").unwrap(), None);

        store.set("selectedProfile", "1").unwrap();
        assert_eq!(store.get("selectedProfile").unwrap().as_deref(), Some("1"));

        store.set("selectedProfile", "2").unwrap();
        assert_eq!(store.get("selectedProfile").unwrap().as_deref(), Some("2"));

        store.remove("selectedProfile").unwrap();
        assert_eq!(store.get("selectedProfile").unwrap(), None);

        // second remove is a no-op
        store.remove("selectedProfile").unwrap();
    }

    #[test]
    fn database_kv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open_at(&dir.path().join("kv.db")).unwrap();
        exercise(&mut db);
    }

    #[test]
    fn memory_kv_round_trip() {
        let mut store = MemoryStore::new();
        exercise(&mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn database_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");

        {
            let mut db = Database::open_at(&path).unwrap();
            db.set("accessToken", "tok-1").unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.get("accessToken").unwrap().as_deref(), Some("tok-1"));
    }
}
