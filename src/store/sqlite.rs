use std::fs;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};
use rusqlite_migration::{Migrations, M};
use tracing::{debug, info};

use crate::app::{Result, WeirError};
use crate::store::{HarvestStateStore, StateSnapshot};

/// Keeps the snapshot in a SQLite table.
///
/// The table is read once at open; `close` replaces its contents inside a
/// single transaction.
pub struct SqliteStateStore {
    conn: Connection,
    snapshot: StateSnapshot,
    persist: bool,
    closed: bool,
}

impl SqliteStateStore {
    pub fn open<P: AsRef<Path>>(path: P, load: bool, persist: bool) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, load, persist)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, true, true)
    }

    fn from_connection(mut conn: Connection, load: bool, persist: bool) -> Result<Self> {
        Self::run_migrations(&mut conn)?;
        let snapshot = if load {
            Self::load(&conn)?
        } else {
            debug!("Skipping state load");
            StateSnapshot::new()
        };
        Ok(Self {
            conn,
            snapshot,
            persist,
            closed: false,
        })
    }

    fn run_migrations(conn: &mut Connection) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        migrations
            .to_latest(conn)
            .map_err(|e| WeirError::Other(format!("state migration failed: {}", e)))?;

        Ok(())
    }

    fn load(conn: &Connection) -> Result<StateSnapshot> {
        let mut stmt = conn.prepare("SELECT namespace, key, value FROM harvest_state")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut snapshot = StateSnapshot::new();
        for row in rows {
            let (namespace, key, value) = row?;
            snapshot.set(&namespace, &key, Some(value));
        }
        Ok(snapshot)
    }

    fn save(&mut self) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM harvest_state", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO harvest_state (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (namespace, key, value) in self.snapshot.entries() {
                stmt.execute(params![namespace, key, value, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    #[cfg(test)]
    fn stored_rows(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM harvest_state", [], |row| row.get(0))?)
    }
}

impl HarvestStateStore for SqliteStateStore {
    fn get(&self, namespace: &str, key: &str) -> Option<String> {
        self.snapshot.get(namespace, key).map(String::from)
    }

    fn set(&mut self, namespace: &str, key: &str, value: Option<String>) {
        self.snapshot.set(namespace, key, value);
    }

    fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if !self.persist {
            info!(state = ?self.snapshot, "Not persisting state");
            return Ok(());
        }
        self.save()?;
        debug!("Persisted state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        let mut store = SqliteStateStore::open(&path, true, true).unwrap();
        store.set("user_timeline", "alice.last_tweet_id", Some("7".into()));
        store.set("blog", "b.last_post_id", Some("9".into()));
        store.close().unwrap();
        drop(store);

        let store = SqliteStateStore::open(&path, true, true).unwrap();
        assert_eq!(
            store.get("user_timeline", "alice.last_tweet_id").as_deref(),
            Some("7")
        );
        assert_eq!(store.get("blog", "b.last_post_id").as_deref(), Some("9"));
    }

    #[test]
    fn test_close_replaces_removed_keys() {
        let mut store = SqliteStateStore::in_memory().unwrap();
        store.set("blog", "a", Some("1".into()));
        store.save().unwrap();
        assert_eq!(store.stored_rows().unwrap(), 1);

        store.set("blog", "a", None);
        store.close().unwrap();
        assert_eq!(store.stored_rows().unwrap(), 0);
    }

    #[test]
    fn test_no_persist_does_not_write() {
        let mut store = SqliteStateStore::in_memory().unwrap();
        store.persist = false;
        store.set("blog", "a", Some("1".into()));
        store.close().unwrap();
        assert_eq!(store.stored_rows().unwrap(), 0);
    }

    #[test]
    fn test_skip_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        let mut store = SqliteStateStore::open(&path, true, true).unwrap();
        store.set("ns", "k", Some("v".into()));
        store.close().unwrap();
        drop(store);

        let store = SqliteStateStore::open(&path, false, true).unwrap();
        assert!(store.snapshot().is_empty());
    }
}
