use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::Result;
use crate::config::ServiceConfig;
use crate::domain::{FetchContext, FetchOutcome, Fetchable, ResourceKind};
use crate::fetcher::{exchanges_to_records, Exchange};
use crate::sources::links::{fragment_links, iframe_src};

pub const NAMESPACE: &str = "blog";

const POST_LIMIT: usize = 20;

/// A blog read through its JSON API, newest posts first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blog {
    pub blog_name: String,
    pub max_posts: Option<usize>,
    service: String,
}

impl Blog {
    pub fn new(blog_name: impl Into<String>, max_posts: Option<usize>, service: impl Into<String>) -> Self {
        Self {
            blog_name: blog_name.into(),
            max_posts,
            service: service.into(),
        }
    }

    fn api_url(&self, service: &ServiceConfig, endpoint: &str, offset: Option<usize>) -> Result<String> {
        let mut url = Url::parse(&format!(
            "{}/blog/{}/{}",
            service.api_root.trim_end_matches('/'),
            self.blog_name,
            endpoint
        ))?;
        let mut pairs = Vec::new();
        if let Some(ref key) = service.api_key {
            pairs.push(("api_key", key.clone()));
        }
        if let Some(offset) = offset {
            pairs.push(("limit", POST_LIMIT.to_string()));
            pairs.push(("offset", offset.to_string()));
        }
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url.to_string())
    }

    pub async fn fetch(&self, ctx: &mut FetchContext<'_>) -> Result<FetchOutcome> {
        let service = ctx.service(&self.service)?;
        let client = ctx.client_for(&service)?;

        let exchanges = client.get(&self.api_url(&service, "info", None)?).await?;
        let Some(info) = success_json(&exchanges) else {
            warn!(blog = %self.blog_name, "Blog info unavailable");
            return Ok(FetchOutcome::empty());
        };
        let mut outcome = FetchOutcome::new(exchanges_to_records(&exchanges), Vec::new());

        let blog = info.get("blog").unwrap_or(&Value::Null);
        let updated = blog.get("updated").and_then(id_string);
        let updated_key = format!("{}.updated", self.blog_name);
        if updated.is_some() && ctx.state.get(NAMESPACE, &updated_key) == updated {
            debug!(blog = %self.blog_name, "No new posts");
            return Ok(outcome);
        }

        let last_post_key = format!("{}.last_post_id", self.blog_name);
        let pending_key = format!("{}.pending_post_id", self.blog_name);
        let resume_key = format!("{}.resume_post_id", self.blog_name);
        let last_post_id = ctx.state.get(NAMESPACE, &last_post_key);
        let pending = ctx.state.get(NAMESPACE, &pending_key);
        let resume = ctx.state.get(NAMESPACE, &resume_key);

        // An unfinished backfill covers pending..=resume; walk past it first.
        let mut skipping = pending.is_some() && resume.is_some();
        let mut newest: Option<String> = None;
        let mut oldest: Option<String> = None;
        let mut collected = 0usize;
        let mut complete = false;
        let mut offset = 0usize;

        'pages: loop {
            let exchanges = client
                .get(&self.api_url(&service, "posts", Some(offset))?)
                .await?;
            let Some(page) = success_json(&exchanges) else {
                warn!(blog = %self.blog_name, offset, "Posts page unavailable");
                break;
            };
            outcome.records.extend(exchanges_to_records(&exchanges));

            let posts = page
                .get("posts")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for post in &posts {
                let id = post.get("id").and_then(id_string);
                if id.is_some() && id == last_post_id {
                    debug!(blog = %self.blog_name, "Reached last harvested post");
                    complete = true;
                    break 'pages;
                }
                if skipping {
                    if id.is_some() && id == resume {
                        debug!(blog = %self.blog_name, "Resuming below harvested posts");
                        skipping = false;
                    }
                    continue;
                }
                if self.max_posts.is_some_and(|max| collected >= max) {
                    break 'pages;
                }
                if newest.is_none() {
                    newest = id.clone();
                }
                if id.is_some() {
                    oldest = id;
                }
                outcome.discovered.extend(post_links(post));
                collected += 1;
            }

            if posts.len() < POST_LIMIT {
                complete = true;
                break;
            }
            offset += POST_LIMIT;
        }

        if complete && skipping {
            // The resume point disappeared; start the backfill over next run.
            warn!(blog = %self.blog_name, "Resume post not found, restarting backfill");
            ctx.state.set(NAMESPACE, &pending_key, None);
            ctx.state.set(NAMESPACE, &resume_key, None);
        } else if complete {
            if let Some(top) = pending.clone().or(newest) {
                ctx.state.set(NAMESPACE, &last_post_key, Some(top));
            }
            ctx.state.set(NAMESPACE, &pending_key, None);
            ctx.state.set(NAMESPACE, &resume_key, None);
            // After a backfill, posts newer than its top are still unharvested.
            if pending.is_none() {
                if let Some(updated) = updated {
                    ctx.state.set(NAMESPACE, &updated_key, Some(updated));
                }
            }
        } else if let Some(oldest) = oldest {
            if pending.is_none() {
                ctx.state.set(NAMESPACE, &pending_key, newest);
            }
            ctx.state.set(NAMESPACE, &resume_key, Some(oldest));
        }
        info!(
            blog = %self.blog_name,
            posts = collected,
            complete,
            links = outcome.discovered.len(),
            "Fetched blog"
        );
        Ok(outcome)
    }
}

/// The JSON body of a successful final hop, unwrapped from its `response`
/// envelope when present.
fn success_json(exchanges: &[Exchange]) -> Option<Value> {
    let last = exchanges.last().filter(|e| e.is_success())?;
    let mut value: Value = serde_json::from_slice(&last.body).ok()?;
    let inner = value.get_mut("response").map(Value::take);
    Some(inner.unwrap_or(value))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn post_links(post: &Value) -> Vec<Fetchable> {
    let mut links = Vec::new();
    match post.get("type").and_then(Value::as_str) {
        Some("photo") => {
            for photo in post.get("photos").and_then(Value::as_array).into_iter().flatten() {
                // The first alternate size is the largest.
                if let Some(url) = photo
                    .pointer("/alt_sizes/0/url")
                    .and_then(Value::as_str)
                {
                    links.push(Fetchable::resource(url, ResourceKind::Image));
                }
            }
        }
        Some("video") => {
            let embed = post
                .pointer("/player/0/embed_code")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if let Some(src) = iframe_src(embed) {
                links.push(Fetchable::resource(src, ResourceKind::Video));
            }
        }
        Some("text") => {
            if let Some(body) = post.get("body").and_then(Value::as_str) {
                links.extend(fragment_links(body));
            }
        }
        other => debug!(post_type = other.unwrap_or("none"), "Skipping post type"),
    }
    links
}
