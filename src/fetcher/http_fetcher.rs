use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, Request, Response};
use tracing::debug;
use url::Url;

use crate::app::{Result, WeirError};
use crate::fetcher::{Exchange, HttpClient};

const MAX_REDIRECTS: usize = 10;

pub const DEFAULT_USER_AGENT: &str = concat!("weir/", env!("CARGO_PKG_VERSION"));

/// `reqwest`-backed client that follows redirects by hand so every hop
/// can be archived.
pub struct ReqwestClient {
    client: Client,
    headers: HeaderMap,
}

impl ReqwestClient {
    pub fn new(user_agent: Option<&str>, bearer_token: Option<&str>) -> Result<Self> {
        let builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .brotli(true)
            .redirect(Policy::none());
        Self::with_builder(builder, user_agent, bearer_token)
    }

    /// A client for kept-open connections: no overall timeout, only a
    /// connect timeout.
    pub fn streaming(user_agent: Option<&str>, bearer_token: Option<&str>) -> Result<Self> {
        let builder = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .gzip(true)
            .redirect(Policy::limited(MAX_REDIRECTS));
        Self::with_builder(builder, user_agent, bearer_token)
    }

    fn with_builder(
        builder: reqwest::ClientBuilder,
        user_agent: Option<&str>,
        bearer_token: Option<&str>,
    ) -> Result<Self> {
        let client = builder.build()?;

        let mut headers = HeaderMap::new();
        let agent = user_agent.unwrap_or(DEFAULT_USER_AGENT);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(agent)
                .map_err(|e| WeirError::Config(format!("bad user agent {:?}: {}", agent, e)))?,
        );
        if let Some(token) = bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| WeirError::Config(format!("bad bearer token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self { client, headers })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    async fn follow(
        &self,
        method: Method,
        url: &str,
        known: &(dyn for<'s> Fn(&'s str) -> bool + Sync),
    ) -> Result<Vec<Exchange>> {
        let mut exchanges = Vec::new();
        let mut current = Url::parse(url)?;

        loop {
            let request = self
                .client
                .request(method.clone(), current.clone())
                .headers(self.headers.clone())
                .build()?;
            let request_header = render_request(&request);

            debug!(method = %method, url = %current, "Sending request");
            let response = self.client.execute(request).await?;
            let status = response.status().as_u16();
            let response_header = render_response(&response);
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = response.bytes().await?.to_vec();

            let exchange = Exchange {
                url: current.to_string(),
                method: method.to_string(),
                request_header,
                status,
                response_header,
                body,
            };
            let redirect = exchange.is_redirect();
            exchanges.push(exchange);

            match location {
                Some(location) if redirect => {
                    if exchanges.len() > MAX_REDIRECTS {
                        return Err(WeirError::Other(format!(
                            "too many redirects starting at {}",
                            url
                        )));
                    }
                    let next = current.join(&location)?;
                    if known(next.as_str()) {
                        debug!(to = %next, "Redirect target already fetched");
                        break;
                    }
                    current = next;
                    debug!(to = %current, "Following redirect");
                }
                _ => break,
            }
        }

        Ok(exchanges)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_until(
        &self,
        url: &str,
        known: &(dyn for<'s> Fn(&'s str) -> bool + Sync),
    ) -> Result<Vec<Exchange>> {
        self.follow(Method::GET, url, known).await
    }

    async fn head(&self, url: &str) -> Result<Vec<Exchange>> {
        self.follow(Method::HEAD, url, &|_: &str| false).await
    }
}

pub(crate) fn render_request(request: &Request) -> String {
    let url = request.url();
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut out = format!("{} {} HTTP/1.1\r\n", request.method(), target);
    if let Some(host) = url.host_str() {
        match url.port() {
            Some(port) => out.push_str(&format!("Host: {}:{}\r\n", host, port)),
            None => out.push_str(&format!("Host: {}\r\n", host)),
        }
    }
    push_headers(&mut out, request.headers());
    out
}

pub(crate) fn render_response(response: &Response) -> String {
    let mut out = format!("{:?} {}\r\n", response.version(), response.status());
    push_headers(&mut out, response.headers());
    out
}

fn push_headers(out: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        out.push_str("\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_request_line_and_host() {
        let client = ReqwestClient::new(Some("tester/1.0"), None).unwrap();
        let request = client
            .inner()
            .get("http://example.com:8080/a/b?x=1")
            .headers(client.headers().clone())
            .build()
            .unwrap();
        let rendered = render_request(&request);
        assert!(rendered.starts_with("GET /a/b?x=1 HTTP/1.1\r\nHost: example.com:8080\r\n"));
        assert!(rendered.contains("user-agent: tester/1.0\r\n"));
    }

    #[test]
    fn test_bearer_token_header() {
        let client = ReqwestClient::new(None, Some("secret")).unwrap();
        assert_eq!(
            client.headers().get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer secret"
        );
        assert_eq!(
            client.headers().get(USER_AGENT).unwrap().to_str().unwrap(),
            DEFAULT_USER_AGENT
        );
    }

    #[test]
    fn test_bad_user_agent_rejected() {
        assert!(ReqwestClient::new(Some("bad\nagent"), None).is_err());
    }
}
