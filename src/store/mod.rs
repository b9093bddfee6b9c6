pub mod json;
pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::Result;

pub use json::JsonStateStore;
pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

/// Namespaced watermarks used for incremental fetching.
///
/// Values are only made durable by [`HarvestStateStore::close`]; nothing is
/// written per `set`.
pub trait HarvestStateStore: Send {
    fn get(&self, namespace: &str, key: &str) -> Option<String>;

    /// Stores `value`, or removes the key when `value` is `None`.
    fn set(&mut self, namespace: &str, key: &str, value: Option<String>);

    fn snapshot(&self) -> &StateSnapshot;

    /// Persists the full mapping. Only the first call has any effect.
    fn close(&mut self) -> Result<()>;
}

/// namespace -> key -> value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSnapshot {
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&str> {
        self.namespaces
            .get(namespace)
            .and_then(|keys| keys.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, namespace: &str, key: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.namespaces
                    .entry(namespace.to_string())
                    .or_default()
                    .insert(key.to_string(), value);
            }
            None => {
                if let Some(keys) = self.namespaces.get_mut(namespace) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.namespaces.remove(namespace);
                    }
                }
            }
        }
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Iterates `(namespace, key, value)` in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.namespaces.iter().flat_map(|(ns, keys)| {
            keys.iter()
                .map(move |(k, v)| (ns.as_str(), k.as_str(), v.as_str()))
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Json,
    Sqlite,
    Memory,
}

/// Opens the configured backend under `data_path`.
///
/// `load` controls whether a prior snapshot is read; `persist` whether
/// `close` writes one back.
pub fn open_state_store(
    backend: StateBackend,
    data_path: &Path,
    load: bool,
    persist: bool,
) -> Result<Box<dyn HarvestStateStore>> {
    Ok(match backend {
        StateBackend::Json => Box::new(JsonStateStore::open(
            data_path.join("state.json"),
            load,
            persist,
        )?),
        StateBackend::Sqlite => Box::new(SqliteStateStore::open(
            data_path.join("state.db"),
            load,
            persist,
        )?),
        StateBackend::Memory => Box::new(MemoryStateStore::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let mut snapshot = StateSnapshot::new();
        snapshot.set("user_timeline", "alice.last_tweet_id", Some("42".into()));
        assert_eq!(snapshot.get("user_timeline", "alice.last_tweet_id"), Some("42"));
        assert_eq!(snapshot.get("user_timeline", "bob.last_tweet_id"), None);
        assert_eq!(snapshot.get("blog", "alice.last_tweet_id"), None);
    }

    #[test]
    fn test_removing_last_key_drops_namespace() {
        let mut snapshot = StateSnapshot::new();
        snapshot.set("blog", "a.updated", Some("1".into()));
        snapshot.set("blog", "b.updated", Some("2".into()));

        snapshot.set("blog", "a.updated", None);
        assert!(snapshot.has_namespace("blog"));
        assert_eq!(snapshot.get("blog", "a.updated"), None);

        snapshot.set("blog", "b.updated", None);
        assert!(!snapshot.has_namespace("blog"));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_removing_missing_key_is_noop() {
        let mut snapshot = StateSnapshot::new();
        snapshot.set("blog", "nothing", None);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_entries_sorted() {
        let mut snapshot = StateSnapshot::new();
        snapshot.set("b", "y", Some("2".into()));
        snapshot.set("a", "x", Some("1".into()));
        let entries: Vec<_> = snapshot.entries().collect();
        assert_eq!(entries, vec![("a", "x", "1"), ("b", "y", "2")]);
    }

    #[test]
    fn test_open_each_backend() {
        let dir = tempfile::tempdir().unwrap();
        for backend in [StateBackend::Json, StateBackend::Sqlite, StateBackend::Memory] {
            let mut store = open_state_store(backend, dir.path(), true, true).unwrap();
            store.set("ns", "k", Some("v".into()));
            assert_eq!(store.get("ns", "k").as_deref(), Some("v"));
            store.close().unwrap();
        }
    }
}
