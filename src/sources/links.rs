use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use crate::domain::{Fetchable, ResourceKind};

/// Assets a page needs to render: images, stylesheets and scripts,
/// resolved against the page's final URL.
pub fn page_links(base: &str, html: &str) -> Vec<Fetchable> {
    let Ok(base) = Url::parse(base) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let rules = [
        ("img[src]", "src", ResourceKind::Image),
        ("link[rel~=\"stylesheet\"][href]", "href", ResourceKind::Stylesheet),
        ("script[src]", "src", ResourceKind::Script),
    ];

    let mut seen: Vec<String> = Vec::new();
    let mut links = Vec::new();
    for (selector, attr, kind) in rules {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            let Some(raw) = element.value().attr(attr) else {
                continue;
            };
            if let Some(url) = resolve(&base, raw) {
                if !seen.contains(&url) {
                    seen.push(url.clone());
                    links.push(Fetchable::resource(url, kind));
                }
            }
        }
    }
    links
}

/// Anchors and images inside an HTML fragment such as a blog post body.
pub fn fragment_links(html: &str) -> Vec<Fetchable> {
    let fragment = Html::parse_fragment(html);
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in fragment.select(&selector) {
            if let Some(href) = element.value().attr("href").and_then(absolute) {
                links.push(Fetchable::unknown(href));
            }
        }
    }
    if let Ok(selector) = Selector::parse("img[src]") {
        for element in fragment.select(&selector) {
            if let Some(src) = element.value().attr("src").and_then(absolute) {
                links.push(Fetchable::resource(src, ResourceKind::Image));
            }
        }
    }
    links
}

/// The player URL of an `<iframe>` embed. Protocol-relative sources get `http:`.
pub fn iframe_src(embed_code: &str) -> Option<String> {
    let fragment = Html::parse_fragment(embed_code);
    let selector = Selector::parse("iframe[src]").ok()?;
    let src = fragment.select(&selector).next()?.value().attr("src")?;
    let src = match src.strip_prefix("//") {
        Some(rest) => format!("http://{}", rest),
        None => src.to_string(),
    };
    absolute(&src)
}

/// Linked URLs (probed) and attached media (images) of one feed item.
pub fn item_links(item: &Value) -> Vec<Fetchable> {
    let mut links = Vec::new();
    let Some(entities) = item.get("entities") else {
        return links;
    };

    if let Some(urls) = entities.get("urls").and_then(Value::as_array) {
        for url in urls {
            if let Some(expanded) = url.get("expanded_url").and_then(Value::as_str) {
                links.push(Fetchable::unknown(expanded));
            }
        }
    }
    if let Some(media) = entities.get("media").and_then(Value::as_array) {
        for medium in media {
            if let Some(media_url) = medium.get("media_url").and_then(Value::as_str) {
                links.push(Fetchable::resource(media_url, ResourceKind::Image));
            }
        }
    }
    links
}

fn resolve(base: &Url, raw: &str) -> Option<String> {
    let joined = base.join(raw.trim()).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

fn absolute(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn urls(links: &[Fetchable]) -> Vec<String> {
        links.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_page_links_resolve_relative() {
        let html = r#"
            <html><head>
              <link rel="stylesheet" href="/css/site.css">
              <link rel="icon" href="/favicon.ico">
              <script src="app.js"></script>
              <script>inline()</script>
            </head><body>
              <img src="img/a.png"><img src="img/a.png">
              <img src="data:image/png;base64,AAAA">
            </body></html>
        "#;
        let links = page_links("http://example.com/blog/post", html);
        assert_eq!(
            urls(&links),
            vec![
                "image http://example.com/blog/img/a.png",
                "stylesheet http://example.com/css/site.css",
                "script http://example.com/blog/app.js",
            ]
        );
    }

    #[test]
    fn test_page_links_bad_base() {
        assert!(page_links("not a url", "<img src='a.png'>").is_empty());
    }

    #[test]
    fn test_fragment_links() {
        let links = fragment_links(
            r#"<p>See <a href="http://a.com/x">this</a> and <a href="/rel">that</a></p>
               <img src="https://cdn.example.com/p.jpg">"#,
        );
        assert_eq!(
            urls(&links),
            vec!["unknown http://a.com/x", "image https://cdn.example.com/p.jpg"]
        );
    }

    #[test]
    fn test_iframe_src_protocol_relative() {
        let embed = r#"<iframe src="//player.vimeo.com/video/123" width="500"></iframe>"#;
        assert_eq!(
            iframe_src(embed).as_deref(),
            Some("http://player.vimeo.com/video/123")
        );
        assert_eq!(iframe_src("<p>no player</p>"), None);
    }

    #[test]
    fn test_item_links() {
        let item = json!({
            "id": 5,
            "entities": {
                "urls": [{"expanded_url": "http://example.com/story"}],
                "media": [{"media_url": "http://pbs.example.com/m.jpg"}]
            }
        });
        assert_eq!(
            urls(&item_links(&item)),
            vec![
                "unknown http://example.com/story",
                "image http://pbs.example.com/m.jpg"
            ]
        );
        assert!(item_links(&json!({"id": 6})).is_empty());
    }
}
