use crate::app::Result;
use crate::store::{HarvestStateStore, StateSnapshot};

/// State that lives only as long as the harvest run.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: StateSnapshot,
    closed: bool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl HarvestStateStore for MemoryStateStore {
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
        self.closed = true;
        Ok(())
    }
}
