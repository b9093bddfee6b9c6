use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{Result, WeirError};
use crate::domain::{FetchContext, FetchOutcome};
use crate::fetcher::exchanges_to_records;
use crate::sources::links::item_links;

pub const NAMESPACE: &str = "user_timeline";

const MAX_PAGES: u32 = 50;

/// An account's timeline, read page by page from a JSON API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTimeline {
    screen_name: Option<String>,
    user_id: Option<String>,
    incremental: bool,
    per_page: Option<u32>,
    service: String,
}

impl UserTimeline {
    /// Exactly one of `screen_name` and `user_id` must be given.
    pub fn new(
        screen_name: Option<String>,
        user_id: Option<String>,
        service: impl Into<String>,
    ) -> Result<Self> {
        if screen_name.is_some() == user_id.is_some() {
            return Err(WeirError::Config(
                "user_timeline needs exactly one of screen_name and user_id".into(),
            ));
        }
        Ok(Self {
            screen_name,
            user_id,
            incremental: true,
            per_page: None,
            service: service.into(),
        })
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_per_page(mut self, per_page: Option<u32>) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn account(&self) -> &str {
        self.screen_name
            .as_deref()
            .or(self.user_id.as_deref())
            .unwrap_or_default()
    }

    pub fn state_key(&self) -> String {
        format!("{}.last_tweet_id", self.account())
    }

    fn page_url(&self, api_root: &str, page: u32, since_id: Option<&str>) -> Result<String> {
        let mut url = Url::parse(&format!(
            "{}/statuses/user_timeline.json",
            api_root.trim_end_matches('/')
        ))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(ref name) = self.screen_name {
                query.append_pair("screen_name", name);
            } else if let Some(ref id) = self.user_id {
                query.append_pair("user_id", id);
            }
            query.append_pair("page", &page.to_string());
            if let Some(count) = self.per_page {
                query.append_pair("count", &count.to_string());
            }
            if let Some(since_id) = since_id {
                query.append_pair("since_id", since_id);
            }
        }
        Ok(url.to_string())
    }

    pub async fn fetch(&self, ctx: &mut FetchContext<'_>) -> Result<FetchOutcome> {
        let service = ctx.service(&self.service)?;
        let client = ctx.client_for(&service)?;
        let key = self.state_key();
        let since_id = if self.incremental {
            ctx.state.get(NAMESPACE, &key)
        } else {
            None
        };

        let mut outcome = FetchOutcome::empty();
        let mut newest: Option<u64> = None;
        // Only a walk that ends on an empty page may move the watermark.
        let mut complete = false;

        for page in 1..=MAX_PAGES {
            let url = self.page_url(&service.api_root, page, since_id.as_deref())?;
            let exchanges = client.get(&url).await?;
            let Some(last) = exchanges.last() else {
                break;
            };
            if !last.is_success() {
                warn!(account = self.account(), page, status = last.status, "Timeline page failed");
                break;
            }

            let items = match serde_json::from_slice::<Value>(&last.body) {
                Ok(Value::Array(items)) => items,
                _ => {
                    warn!(account = self.account(), page, "Malformed timeline page");
                    break;
                }
            };
            if items.is_empty() {
                complete = true;
                break;
            }

            outcome.records.extend(exchanges_to_records(&exchanges));
            for item in &items {
                if let Some(id) = item_id(item) {
                    newest = newest.max(Some(id));
                }
                outcome.discovered.extend(item_links(item));
            }
            debug!(account = self.account(), page, items = items.len(), "Read timeline page");
        }

        if self.incremental && complete {
            if let Some(newest) = newest {
                ctx.state.set(NAMESPACE, &key, Some(newest.to_string()));
            }
        } else if self.incremental && newest.is_some() {
            warn!(account = self.account(), "Timeline walk incomplete, keeping watermark");
        }
        info!(
            account = self.account(),
            complete,
            records = outcome.records.len(),
            links = outcome.discovered.len(),
            "Fetched timeline"
        );
        Ok(outcome)
    }
}

fn item_id(item: &Value) -> Option<u64> {
    let id = item.get("id")?;
    id.as_u64().or_else(|| id.as_str()?.parse().ok())
}
