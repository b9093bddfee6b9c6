use std::collections::HashSet;

/// Locators already handled during this run.
///
/// Retrievals and type probes are tracked separately: probing a locator must
/// not make the retrieval it resolves to look like a duplicate.
#[derive(Debug, Default)]
pub struct FetchedSet {
    fetched: HashSet<String>,
    probed: HashSet<String>,
}

impl FetchedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fetched(&self, url: &str) -> bool {
        self.fetched.contains(url)
    }

    /// Returns false if `url` was already marked.
    pub fn mark_fetched(&mut self, url: &str) -> bool {
        self.fetched.insert(url.to_string())
    }

    pub fn is_probed(&self, url: &str) -> bool {
        self.probed.contains(url)
    }

    pub fn mark_probed(&mut self, url: &str) -> bool {
        self.probed.insert(url.to_string())
    }

    pub fn len(&self) -> usize {
        self.fetched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetched.is_empty()
    }
}
