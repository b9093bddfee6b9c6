use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::{Result, WeirError};
use crate::domain::{Fetchable, ResourceKind};
use crate::sources::{Blog, StreamCapture, UserTimeline};

fn default_true() -> bool {
    true
}

fn default_twitter() -> String {
    "twitter".to_string()
}

fn default_tumblr() -> String {
    "tumblr".to_string()
}

/// One `[[seeds]]` entry, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Seed {
    UserTimeline {
        #[serde(default)]
        screen_name: Option<String>,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default = "default_true")]
        incremental: bool,
        #[serde(default)]
        per_page: Option<u32>,
        #[serde(default = "default_twitter")]
        service: String,
    },
    Blog {
        blog_name: String,
        #[serde(default)]
        max_posts: Option<usize>,
        #[serde(default = "default_tumblr")]
        service: String,
    },
    /// Mines every capture aliased under `<data_path>/<name>/`.
    StreamReplay { name: String },
    /// A resource of known kind, or of unknown kind to be probed.
    Resource {
        url: String,
        #[serde(default)]
        kind: Option<ResourceKind>,
    },
}

impl Seed {
    pub fn into_fetchables(self, data_path: &Path) -> Result<Vec<Fetchable>> {
        match self {
            Seed::UserTimeline {
                screen_name,
                user_id,
                incremental,
                per_page,
                service,
            } => {
                let timeline = UserTimeline::new(screen_name, user_id, service)?
                    .with_incremental(incremental)
                    .with_per_page(per_page);
                Ok(vec![Fetchable::UserTimeline(timeline)])
            }
            Seed::Blog {
                blog_name,
                max_posts,
                service,
            } => Ok(vec![Fetchable::Blog(Blog::new(blog_name, max_posts, service))]),
            Seed::StreamReplay { name } => stream_aliases(data_path, &name),
            Seed::Resource { url, kind } => {
                if url.trim().is_empty() {
                    return Err(WeirError::Config("resource seed has an empty url".into()));
                }
                Ok(vec![match kind {
                    Some(kind) => Fetchable::resource(url, kind),
                    None => Fetchable::unknown(url),
                }])
            }
        }
    }
}

fn stream_aliases(data_path: &Path, name: &str) -> Result<Vec<Fetchable>> {
    let dir = data_path.join(name);
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "No stream captures waiting");
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "warc") {
            paths.push(path);
        }
    }
    paths.sort();

    debug!(stream = name, count = paths.len(), "Found stream captures");
    Ok(paths
        .into_iter()
        .map(|p| Fetchable::StreamCapture(StreamCapture::new(p)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Seeds {
        seeds: Vec<Seed>,
    }

    #[test]
    fn test_parse_seed_list() {
        let parsed: Seeds = toml::from_str(
            r#"
            [[seeds]]
            type = "user_timeline"
            screen_name = "alice"

            [[seeds]]
            type = "blog"
            blog_name = "example"
            max_posts = 40

            [[seeds]]
            type = "stream_replay"
            name = "garden"

            [[seeds]]
            type = "resource"
            url = "http://example.com/"
            kind = "html"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.seeds.len(), 4);
        assert_eq!(
            parsed.seeds[0],
            Seed::UserTimeline {
                screen_name: Some("alice".into()),
                user_id: None,
                incremental: true,
                per_page: None,
                service: "twitter".into(),
            }
        );
        assert_eq!(
            parsed.seeds[3],
            Seed::Resource {
                url: "http://example.com/".into(),
                kind: Some(ResourceKind::Html),
            }
        );
    }

    #[test]
    fn test_resource_without_kind_is_probed() {
        let seed = Seed::Resource {
            url: "http://example.com/x".into(),
            kind: None,
        };
        let items = seed.into_fetchables(Path::new("/tmp")).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].resolves_type());
    }

    #[test]
    fn test_timeline_needs_exactly_one_account() {
        let seed = Seed::UserTimeline {
            screen_name: Some("a".into()),
            user_id: Some("1".into()),
            incremental: true,
            per_page: None,
            service: "twitter".into(),
        };
        assert!(seed.into_fetchables(Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_stream_replay_lists_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let stream_dir = dir.path().join("garden");
        fs::create_dir_all(&stream_dir).unwrap();
        fs::write(stream_dir.join("b.warc"), b"").unwrap();
        fs::write(stream_dir.join("a.warc"), b"").unwrap();
        fs::write(stream_dir.join("notes.txt"), b"").unwrap();

        let items = Seed::StreamReplay {
            name: "garden".into(),
        }
        .into_fetchables(dir.path())
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind(), "stream_capture");
        assert!(items[0].to_string().ends_with("a.warc"));
    }

    #[test]
    fn test_stream_replay_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let items = Seed::StreamReplay {
            name: "nothing".into(),
        }
        .into_fetchables(dir.path())
        .unwrap();
        assert!(items.is_empty());
    }
}
