use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{tags_intersect, Fetchable, ResourceType};
use crate::harvest::queue::Depth;

/// Decides whether an item found at a given depth is fetched.
pub trait FetchStrategy: Send + Sync {
    fn decide(&self, item: &Fetchable, depth: Depth) -> bool;
}

/// Limited-depth harvesting:
///
/// * depth 1 (seeds) is always fetched,
/// * depth 2 is fetched when its tags match `depth2_admit`,
/// * depth 3 is fetched when its tags match `depth3_admit`.
///
/// Type probes are admitted at depths 2 and 3 since their kind is not yet
/// known. With `page_parts_beyond_depth2`, page assets are admitted at any
/// depth past 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthStrategy {
    pub depth2_admit: Vec<ResourceType>,
    pub depth3_admit: Vec<ResourceType>,
    pub page_parts_beyond_depth2: bool,
}

impl Default for DepthStrategy {
    fn default() -> Self {
        Self {
            depth2_admit: Vec::new(),
            depth3_admit: vec![ResourceType::Image],
            page_parts_beyond_depth2: false,
        }
    }
}

impl DepthStrategy {
    pub fn new(depth2_admit: Vec<ResourceType>, depth3_admit: Vec<ResourceType>) -> Self {
        Self {
            depth2_admit,
            depth3_admit,
            page_parts_beyond_depth2: false,
        }
    }

    pub fn with_page_parts_beyond_depth2(mut self, enabled: bool) -> Self {
        self.page_parts_beyond_depth2 = enabled;
        self
    }

    /// Seeds only.
    pub fn seeds_only() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    fn admit_at(&self, item: &Fetchable, depth: Depth, admit: &[ResourceType]) -> bool {
        if tags_intersect(item.tags(), admit) {
            debug!(item = %item, depth, "Fetching, in admit list");
            true
        } else if item.resolves_type() {
            debug!(item = %item, depth, "Fetching, type must be probed");
            true
        } else {
            debug!(item = %item, depth, "Not fetching, not in admit list");
            false
        }
    }
}

impl FetchStrategy for DepthStrategy {
    fn decide(&self, item: &Fetchable, depth: Depth) -> bool {
        if !item.is_retrievable() {
            debug!(item = %item, "Not fetching, not retrievable");
            return false;
        }
        if depth == 1 {
            debug!(item = %item, "Fetching seed");
            return true;
        }
        if self.page_parts_beyond_depth2
            && depth > 2
            && tags_intersect(item.tags(), &[ResourceType::WebPagePart])
        {
            debug!(item = %item, depth, "Fetching page part");
            return true;
        }
        match depth {
            2 => self.admit_at(item, depth, &self.depth2_admit),
            3 => self.admit_at(item, depth, &self.depth3_admit),
            _ => {
                debug!(item = %item, depth, "Not fetching, too deep");
                false
            }
        }
    }
}
