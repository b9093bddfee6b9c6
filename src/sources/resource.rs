use tracing::{debug, warn};

use crate::app::Result;
use crate::domain::{FetchContext, FetchOutcome, Fetchable, ResourceKind};
use crate::fetcher::exchanges_to_records;
use crate::sources::links::page_links;

/// A web resource retrieved with a plain GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: String,
    pub kind: ResourceKind,
}

impl Resource {
    pub fn new(url: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    pub async fn fetch(&self, ctx: &mut FetchContext<'_>) -> Result<FetchOutcome> {
        if ctx.fetched.is_fetched(&self.url) {
            debug!(url = %self.url, "Already fetched");
            return Ok(FetchOutcome::empty());
        }

        let client = ctx.http()?;
        let exchanges = {
            let fetched = &*ctx.fetched;
            client
                .get_until(&self.url, &|url: &str| fetched.is_fetched(url))
                .await?
        };

        ctx.fetched.mark_fetched(&self.url);
        for exchange in &exchanges {
            ctx.fetched.mark_fetched(&exchange.url);
        }

        let Some(last) = exchanges.last() else {
            return Ok(FetchOutcome::empty());
        };
        if last.is_redirect() {
            debug!(url = %self.url, hops = exchanges.len(), "Stopped at redirect");
            return Ok(FetchOutcome::new(exchanges_to_records(&exchanges), Vec::new()));
        }
        if !last.is_success() {
            warn!(url = %self.url, status = last.status, "Getting resource failed");
            return Ok(FetchOutcome::empty());
        }

        let discovered = match self.kind {
            ResourceKind::Html => page_links(&last.url, &String::from_utf8_lossy(&last.body)),
            _ => Vec::new(),
        };
        debug!(url = %self.url, hops = exchanges.len(), links = discovered.len(), "Fetched resource");

        Ok(FetchOutcome::new(exchanges_to_records(&exchanges), discovered))
    }
}

/// A locator whose type must be probed before it can be retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unknown {
    pub url: String,
}

impl Unknown {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// HEADs the locator and yields a resource of the matching kind.
    ///
    /// The locator is marked probed whatever the outcome, including a failed
    /// request, so it is not probed again this run.
    pub async fn fetch(&self, ctx: &mut FetchContext<'_>) -> Result<FetchOutcome> {
        if ctx.fetched.is_probed(&self.url) || ctx.fetched.is_fetched(&self.url) {
            debug!(url = %self.url, "Already fetched");
            return Ok(FetchOutcome::empty());
        }
        ctx.fetched.mark_probed(&self.url);

        let client = ctx.http()?;
        let exchanges = match client.head(&self.url).await {
            Ok(exchanges) => exchanges,
            Err(e) => {
                warn!(url = %self.url, "Probe failed: {}", e);
                return Ok(FetchOutcome::empty());
            }
        };

        let Some(last) = exchanges.last() else {
            return Ok(FetchOutcome::empty());
        };
        if !last.is_success() {
            warn!(url = %self.url, status = last.status, "Probe returned failure");
            return Ok(FetchOutcome::empty());
        }

        let Some(content_type) = last.content_type() else {
            warn!(url = %self.url, "No content type");
            return Ok(FetchOutcome::empty());
        };

        match ResourceKind::from_content_type(content_type) {
            Some(kind) => {
                debug!(url = %self.url, kind = kind.as_str(), "Resolved type");
                Ok(FetchOutcome::new(
                    Vec::new(),
                    vec![Fetchable::resource(self.url.clone(), kind)],
                ))
            }
            None => {
                debug!(url = %self.url, content_type, "Unsupported content type");
                Ok(FetchOutcome::empty())
            }
        }
    }
}

/// Acknowledged content that is never retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsupported {
    pub url: String,
}

impl Unsupported {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}
