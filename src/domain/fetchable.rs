use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app::{HttpClients, Result, WeirError};
use crate::app::ClientKey;
use crate::capture::CaptureRecord;
use crate::config::ServiceConfig;
use crate::domain::{FetchedSet, ResourceType};
use crate::fetcher::HttpClient;
use crate::sources::{Blog, Resource, StreamCapture, Unknown, Unsupported, UserTimeline};
use crate::store::HarvestStateStore;

/// Concrete kind of a directly retrievable web resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Resource,
    Html,
    Image,
    Stylesheet,
    Script,
    Pdf,
    Video,
}

impl ResourceKind {
    pub fn tags(self) -> &'static [ResourceType] {
        match self {
            ResourceKind::Resource => &[ResourceType::Any],
            ResourceKind::Html => &[ResourceType::WebPage],
            ResourceKind::Image => &[ResourceType::Image],
            ResourceKind::Stylesheet => &[ResourceType::Stylesheet],
            ResourceKind::Script => &[ResourceType::Script],
            ResourceKind::Pdf => &[ResourceType::Document],
            ResourceKind::Video => &[ResourceType::Video],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Resource => "resource",
            ResourceKind::Html => "html",
            ResourceKind::Image => "image",
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Script => "script",
            ResourceKind::Pdf => "pdf",
            ResourceKind::Video => "video",
        }
    }

    /// Maps a `Content-Type` value to the kind that should retrieve it.
    pub fn from_content_type(content_type: &str) -> Option<ResourceKind> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Some(ResourceKind::Html),
            "application/pdf" => Some(ResourceKind::Pdf),
            "text/css" => Some(ResourceKind::Stylesheet),
            "text/javascript" | "application/javascript" | "application/x-javascript" => {
                Some(ResourceKind::Script)
            }
            m if m.starts_with("image/") => Some(ResourceKind::Image),
            m if m.starts_with("video/") => Some(ResourceKind::Video),
            _ => None,
        }
    }
}

/// What a fetch produced: records to archive and newly found work.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<CaptureRecord>,
    pub discovered: Vec<Fetchable>,
}

impl FetchOutcome {
    pub fn new(records: Vec<CaptureRecord>, discovered: Vec<Fetchable>) -> Self {
        Self {
            records,
            discovered,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.discovered.is_empty()
    }
}

/// Everything a fetch may touch besides the network.
pub struct FetchContext<'a> {
    pub clients: &'a mut HttpClients,
    pub services: &'a HashMap<String, ServiceConfig>,
    pub fetched: &'a mut FetchedSet,
    pub state: &'a mut dyn HarvestStateStore,
    /// Nothing is persisted and consumable inputs are left in place.
    pub dry_run: bool,
}

impl FetchContext<'_> {
    /// Anonymous client for plain web resources.
    pub fn http(&mut self) -> Result<Arc<dyn HttpClient>> {
        self.clients.default_client()
    }

    /// Settings for a named service, falling back to its built-in defaults.
    pub fn service(&self, name: &str) -> Result<ServiceConfig> {
        match self.services.get(name) {
            Some(config) => Ok(config.clone()),
            None => ServiceConfig::builtin(name).ok_or_else(|| {
                WeirError::Config(format!("no [services.{}] section configured", name))
            }),
        }
    }

    pub fn client_for(&mut self, service: &ServiceConfig) -> Result<Arc<dyn HttpClient>> {
        let key = ClientKey::new(service.user_agent.as_deref(), service.bearer_token.as_deref());
        self.clients.get(&key)
    }
}

/// Extension point for integrations that are not built in.
#[async_trait]
pub trait Producer: Send + Sync + fmt::Debug {
    /// Name matched against the `exclude` list.
    fn kind(&self) -> &str;

    fn locator(&self) -> String;

    fn is_retrievable(&self) -> bool {
        true
    }

    fn tags(&self) -> &[ResourceType];

    /// True if fetching only determines the concrete type of another item.
    fn resolves_type(&self) -> bool {
        false
    }

    async fn fetch(&self, ctx: &mut FetchContext<'_>) -> Result<FetchOutcome>;
}

/// One unit of work in a harvest.
#[derive(Debug)]
pub enum Fetchable {
    UserTimeline(UserTimeline),
    Blog(Blog),
    StreamCapture(StreamCapture),
    Resource(Resource),
    Unknown(Unknown),
    Unsupported(Unsupported),
    External(Box<dyn Producer>),
}

impl Fetchable {
    pub fn resource(url: impl Into<String>, kind: ResourceKind) -> Self {
        Fetchable::Resource(Resource::new(url, kind))
    }

    pub fn unknown(url: impl Into<String>) -> Self {
        Fetchable::Unknown(Unknown::new(url))
    }

    pub fn kind(&self) -> &str {
        match self {
            Fetchable::UserTimeline(_) => "user_timeline",
            Fetchable::Blog(_) => "blog",
            Fetchable::StreamCapture(_) => "stream_capture",
            Fetchable::Resource(r) => r.kind.as_str(),
            Fetchable::Unknown(_) => "unknown",
            Fetchable::Unsupported(_) => "unsupported",
            Fetchable::External(p) => p.kind(),
        }
    }

    pub fn is_retrievable(&self) -> bool {
        match self {
            Fetchable::Unsupported(_) => false,
            Fetchable::External(p) => p.is_retrievable(),
            _ => true,
        }
    }

    pub fn tags(&self) -> &[ResourceType] {
        match self {
            Fetchable::UserTimeline(_) | Fetchable::Blog(_) | Fetchable::StreamCapture(_) => {
                &[ResourceType::Feed]
            }
            Fetchable::Resource(r) => r.kind.tags(),
            Fetchable::Unknown(_) | Fetchable::Unsupported(_) => &[ResourceType::Any],
            Fetchable::External(p) => p.tags(),
        }
    }

    pub fn resolves_type(&self) -> bool {
        match self {
            Fetchable::Unknown(_) => true,
            Fetchable::External(p) => p.resolves_type(),
            _ => false,
        }
    }

    pub async fn fetch(&self, ctx: &mut FetchContext<'_>) -> Result<FetchOutcome> {
        match self {
            Fetchable::UserTimeline(t) => t.fetch(ctx).await,
            Fetchable::Blog(b) => b.fetch(ctx).await,
            Fetchable::StreamCapture(s) => s.fetch(!ctx.dry_run).await,
            Fetchable::Resource(r) => r.fetch(ctx).await,
            Fetchable::Unknown(u) => u.fetch(ctx).await,
            Fetchable::Unsupported(u) => Err(WeirError::Other(format!(
                "{} is not retrievable",
                u.url
            ))),
            Fetchable::External(p) => p.fetch(ctx).await,
        }
    }
}

impl fmt::Display for Fetchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetchable::UserTimeline(t) => write!(f, "user timeline of {}", t.account()),
            Fetchable::Blog(b) => write!(f, "blog {}", b.blog_name),
            Fetchable::StreamCapture(s) => write!(f, "stream capture at {}", s.path.display()),
            Fetchable::Resource(r) => write!(f, "{} {}", r.kind.as_str(), r.url),
            Fetchable::Unknown(u) => write!(f, "unknown {}", u.url),
            Fetchable::Unsupported(u) => write!(f, "unsupported {}", u.url),
            Fetchable::External(p) => write!(f, "{} {}", p.kind(), p.locator()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource_type::tags_intersect;

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(
            ResourceKind::from_content_type("text/html; charset=UTF-8"),
            Some(ResourceKind::Html)
        );
        assert_eq!(
            ResourceKind::from_content_type("image/png"),
            Some(ResourceKind::Image)
        );
        assert_eq!(
            ResourceKind::from_content_type("application/pdf"),
            Some(ResourceKind::Pdf)
        );
        assert_eq!(
            ResourceKind::from_content_type("Text/CSS"),
            Some(ResourceKind::Stylesheet)
        );
        assert_eq!(ResourceKind::from_content_type("application/zip"), None);
    }

    #[test]
    fn test_variant_capabilities() {
        let image = Fetchable::resource("http://a/x.png", ResourceKind::Image);
        assert_eq!(image.kind(), "image");
        assert!(image.is_retrievable());
        assert!(!image.resolves_type());
        assert!(tags_intersect(image.tags(), &[ResourceType::WebPagePart]));

        let unknown = Fetchable::unknown("http://a/");
        assert!(unknown.resolves_type());
        assert_eq!(unknown.tags(), &[ResourceType::Any]);

        let unsupported = Fetchable::Unsupported(Unsupported::new("ftp://a/"));
        assert!(!unsupported.is_retrievable());
    }

    #[test]
    fn test_display() {
        let page = Fetchable::resource("http://a/", ResourceKind::Html);
        assert_eq!(page.to_string(), "html http://a/");
    }
}
