use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::app::Result;
use crate::store::{HarvestStateStore, StateSnapshot};

/// Keeps the snapshot as a pretty-printed JSON document.
///
/// `close` writes `<path>.tmp` and renames it over the previous snapshot, so
/// a crash mid-write leaves the old file intact.
#[derive(Debug)]
pub struct JsonStateStore {
    path: PathBuf,
    snapshot: StateSnapshot,
    persist: bool,
    closed: bool,
}

impl JsonStateStore {
    pub fn open<P: Into<PathBuf>>(path: P, load: bool, persist: bool) -> Result<Self> {
        let path = path.into();
        let snapshot = if load {
            Self::load(&path)?
        } else {
            debug!(path = %path.display(), "Skipping state load");
            StateSnapshot::new()
        };

        Ok(Self {
            path,
            snapshot,
            persist,
            closed: false,
        })
    }

    fn load(path: &Path) -> Result<StateSnapshot> {
        match fs::read_to_string(path) {
            Ok(data) => {
                let snapshot: StateSnapshot = serde_json::from_str(&data)?;
                debug!(path = %path.display(), "Loaded state");
                Ok(snapshot)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StateSnapshot::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HarvestStateStore for JsonStateStore {
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

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Persisted state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = JsonStateStore::open(&path, true, true).unwrap();
        store.set("user_timeline", "alice.last_tweet_id", Some("100".into()));
        store.set("blog", "b.updated", Some("1700000000".into()));
        store.close().unwrap();

        let store = JsonStateStore::open(&path, true, true).unwrap();
        assert_eq!(
            store.get("user_timeline", "alice.last_tweet_id").as_deref(),
            Some("100")
        );
        assert_eq!(store.get("blog", "b.updated").as_deref(), Some("1700000000"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_skip_load_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"blog":{"x":"1"}}"#).unwrap();

        let store = JsonStateStore::open(&path, false, true).unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_no_persist_leaves_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"blog":{"x":"1"}}"#).unwrap();

        let mut store = JsonStateStore::open(&path, true, false).unwrap();
        store.set("blog", "x", Some("2".into()));
        store.close().unwrap();

        let reloaded = JsonStateStore::open(&path, true, true).unwrap();
        assert_eq!(reloaded.get("blog", "x").as_deref(), Some("1"));
    }

    #[test]
    fn test_close_only_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = JsonStateStore::open(&path, true, true).unwrap();
        store.set("ns", "k", Some("v".into()));
        store.close().unwrap();
        fs::remove_file(&path).unwrap();
        store.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_malformed_snapshot_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        assert!(JsonStateStore::open(&path, true, true).is_err());
    }
}
