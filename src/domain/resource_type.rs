use std::fmt;

use serde::{Deserialize, Serialize};

/// Capability tags describing what kind of thing a fetchable item is.
///
/// The tags form a rooted hierarchy:
///
/// ```text
/// Any
/// ├── WebPage
/// ├── WebPagePart
/// │   ├── Image
/// │   ├── Stylesheet
/// │   ├── Script
/// │   └── Document
/// ├── Video
/// └── Feed
/// ```
///
/// Membership checks always walk the ancestor chain, so an `Image` also
/// satisfies `WebPagePart` and `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Any,
    WebPage,
    WebPagePart,
    Image,
    Stylesheet,
    Script,
    Document,
    Video,
    Feed,
}

impl ResourceType {
    pub fn parent(self) -> Option<ResourceType> {
        match self {
            ResourceType::Any => None,
            ResourceType::WebPage
            | ResourceType::WebPagePart
            | ResourceType::Video
            | ResourceType::Feed => Some(ResourceType::Any),
            ResourceType::Image
            | ResourceType::Stylesheet
            | ResourceType::Script
            | ResourceType::Document => Some(ResourceType::WebPagePart),
        }
    }

    /// Iterates over this tag and all of its ancestors, most specific first.
    pub fn ancestry(self) -> impl Iterator<Item = ResourceType> {
        std::iter::successors(Some(self), |t| t.parent())
    }

    /// True if `self` is `other` or a descendant of it.
    pub fn is_a(self, other: ResourceType) -> bool {
        self.ancestry().any(|t| t == other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Any => "any",
            ResourceType::WebPage => "web_page",
            ResourceType::WebPagePart => "web_page_part",
            ResourceType::Image => "image",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Script => "script",
            ResourceType::Document => "document",
            ResourceType::Video => "video",
            ResourceType::Feed => "feed",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True if any of `tags` (or any of their ancestors) is in `wanted`.
pub fn tags_intersect(tags: &[ResourceType], wanted: &[ResourceType]) -> bool {
    tags.iter()
        .any(|tag| wanted.iter().any(|w| tag.is_a(*w)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ancestry() {
        let chain: Vec<_> = ResourceType::Image.ancestry().collect();
        assert_eq!(
            chain,
            vec![
                ResourceType::Image,
                ResourceType::WebPagePart,
                ResourceType::Any
            ]
        );
    }

    #[test]
    fn test_is_a_walks_ancestors() {
        assert!(ResourceType::Stylesheet.is_a(ResourceType::WebPagePart));
        assert!(ResourceType::Document.is_a(ResourceType::Any));
        assert!(ResourceType::Video.is_a(ResourceType::Any));
        assert!(!ResourceType::Video.is_a(ResourceType::WebPagePart));
        assert!(!ResourceType::WebPagePart.is_a(ResourceType::Image));
        assert!(!ResourceType::WebPage.is_a(ResourceType::WebPagePart));
    }

    #[test]
    fn test_tags_intersect_uses_full_ancestor_set() {
        let tags = [ResourceType::Image];
        assert!(tags_intersect(&tags, &[ResourceType::WebPagePart]));
        assert!(tags_intersect(&tags, &[ResourceType::Any]));
        assert!(!tags_intersect(&tags, &[ResourceType::WebPage]));
        assert!(!tags_intersect(&tags, &[]));
    }

    #[test]
    fn test_deserialize_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            tags: Vec<ResourceType>,
        }
        let parsed: Wrapper =
            toml::from_str(r#"tags = ["web_page_part", "image"]"#).unwrap();
        assert_eq!(
            parsed.tags,
            vec![ResourceType::WebPagePart, ResourceType::Image]
        );
    }
}
