//! Database connection and query operations.

use crate::{migrations, DatabaseResult, SignalHitRecord};
use audience_storage::{DataStore, StorageResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::debug;

/// Database wrapper with query methods.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ==========================================
    // Data store
    // ==========================================

    /// Get a stored value.
    pub fn get_value(&self, key: &str) -> DatabaseResult<Option<String>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT value FROM data_store WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace a stored value.
    pub fn set_value(&self, key: &str, value: &str) -> DatabaseResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO data_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;
        Ok(())
    }

    /// Delete a stored value.
    pub fn delete_value(&self, key: &str) -> DatabaseResult<bool> {
        let count = self
            .conn
            .lock()
            .execute("DELETE FROM data_store WHERE key = ?1", params![key])?;
        Ok(count > 0)
    }

    // ==========================================
    // Signal hits
    // ==========================================

    /// Append a hit to the tail of the persisted queue.
    pub fn insert_signal_hit(&self, hit: &SignalHitRecord) -> DatabaseResult<()> {
        self.conn.lock().execute(
            "INSERT INTO signal_hits (id, created_at, url, timeout_secs, event_sequence, pair_id, event_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                hit.id,
                hit.created_at.to_rfc3339(),
                hit.url,
                hit.timeout_secs as i64,
                hit.event_sequence.map(|s| s as i64),
                hit.pair_id,
                hit.event_json,
            ],
        )?;
        debug!(hit_id = %hit.id, "Persisted signal hit");
        Ok(())
    }

    /// All persisted hits in insertion order.
    pub fn list_signal_hits(&self) -> DatabaseResult<Vec<SignalHitRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, url, timeout_secs, event_sequence, pair_id, event_json
             FROM signal_hits ORDER BY position ASC",
        )?;

        let hits = stmt
            .query_map([], |row| {
                Ok(SignalHitRecord {
                    id: row.get(0)?,
                    created_at: parse_datetime(row.get::<_, String>(1)?),
                    url: row.get(2)?,
                    timeout_secs: row.get::<_, i64>(3)?.max(0) as u64,
                    event_sequence: row.get::<_, Option<i64>>(4)?.map(|s| s.max(0) as u64),
                    pair_id: row.get(5)?,
                    event_json: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(hits)
    }

    /// Number of persisted hits.
    pub fn count_signal_hits(&self) -> DatabaseResult<usize> {
        let count: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM signal_hits", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Remove one hit. Returns whether it existed.
    pub fn delete_signal_hit(&self, id: &str) -> DatabaseResult<bool> {
        let count = self
            .conn
            .lock()
            .execute("DELETE FROM signal_hits WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    /// Remove every hit.
    pub fn delete_all_signal_hits(&self) -> DatabaseResult<usize> {
        let count = self.conn.lock().execute("DELETE FROM signal_hits", [])?;
        Ok(count)
    }

    /// Null out pairing ids and sequence numbers of all stored hits.
    ///
    /// Called once on startup: nobody from a previous process can still be
    /// waiting on those ids.
    pub fn clear_signal_hit_pairing(&self) -> DatabaseResult<usize> {
        let count = self.conn.lock().execute(
            "UPDATE signal_hits SET event_sequence = NULL, pair_id = NULL
             WHERE event_sequence IS NOT NULL OR pair_id IS NOT NULL",
            [],
        )?;
        Ok(count)
    }
}

impl DataStore for Database {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        Ok(self.set_value(key, value)?)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.get_value(key)?)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.delete_value(key)?)
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn hit(id: &str, sequence: Option<u64>, pair_id: Option<&str>) -> SignalHitRecord {
        SignalHitRecord {
            id: id.to_string(),
            created_at: Utc::now(),
            url: format!("https://dpm.example.net/event?c_id={}", id),
            timeout_secs: 2,
            event_sequence: sequence,
            pair_id: pair_id.map(str::to_string),
            event_json: "{}".to_string(),
        }
    }

    #[test]
    fn test_data_store_values() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.get_value("visitor.uuid").unwrap(), None);
        db.set_value("visitor.uuid", "u-1").unwrap();
        db.set_value("visitor.uuid", "u-2").unwrap();
        assert_eq!(db.get_value("visitor.uuid").unwrap(), Some("u-2".to_string()));

        assert!(db.delete_value("visitor.uuid").unwrap());
        assert!(!db.delete_value("visitor.uuid").unwrap());
    }

    #[test]
    fn test_data_store_trait_maps() {
        let db = Database::open_in_memory().unwrap();
        let mut profile = BTreeMap::new();
        profile.insert("seg".to_string(), "1".to_string());

        DataStore::set_map(&db, "visitor.profile", &profile).unwrap();
        assert_eq!(
            DataStore::get_map(&db, "visitor.profile").unwrap(),
            Some(profile)
        );
    }

    #[test]
    fn test_signal_hits_keep_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_signal_hit(&hit("b", Some(2), None)).unwrap();
        db.insert_signal_hit(&hit("a", Some(3), None)).unwrap();
        db.insert_signal_hit(&hit("c", Some(1), None)).unwrap();

        let ids: Vec<_> = db
            .list_signal_hits()
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(db.count_signal_hits().unwrap(), 3);
    }

    #[test]
    fn test_delete_signal_hits() {
        let db = Database::open_in_memory().unwrap();
        db.insert_signal_hit(&hit("a", None, None)).unwrap();
        db.insert_signal_hit(&hit("b", None, None)).unwrap();

        assert!(db.delete_signal_hit("a").unwrap());
        assert!(!db.delete_signal_hit("a").unwrap());
        assert_eq!(db.count_signal_hits().unwrap(), 1);

        assert_eq!(db.delete_all_signal_hits().unwrap(), 1);
        assert!(db.list_signal_hits().unwrap().is_empty());
    }

    #[test]
    fn test_clear_pairing_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audience.sqlite");

        {
            let db = Database::open(&path).unwrap();
            db.insert_signal_hit(&hit("a", Some(7), Some("pair-1"))).unwrap();
            db.insert_signal_hit(&hit("b", None, None)).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.clear_signal_hit_pairing().unwrap(), 1);

        let hits = db.list_signal_hits().unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits
            .iter()
            .all(|h| h.event_sequence.is_none() && h.pair_id.is_none()));
        assert_eq!(hits[0].url, "https://dpm.example.net/event?c_id=a");
    }
}
