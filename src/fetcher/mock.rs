use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::app::{Result, WeirError};
use crate::fetcher::{Exchange, HttpClient};

/// Answers from a fixed table and records every call.
#[derive(Default)]
pub struct ScriptedClient {
    gets: HashMap<String, Vec<Exchange>>,
    heads: HashMap<String, Vec<Exchange>>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

pub fn exchange(method: &str, url: &str, status: u16, content_type: &str, body: &[u8]) -> Exchange {
    Exchange {
        url: url.to_string(),
        method: method.to_string(),
        request_header: format!("{} {} HTTP/1.1\r\n", method, url),
        status,
        response_header: format!("HTTP/1.1 {} X\r\nContent-Type: {}\r\n", status, content_type),
        body: body.to_vec(),
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, content_type: &str, body: &str) -> Self {
        self.gets.insert(
            url.to_string(),
            vec![exchange("GET", url, 200, content_type, body.as_bytes())],
        );
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.gets.insert(
            url.to_string(),
            vec![exchange("GET", url, status, "text/plain", b"")],
        );
        self
    }

    pub fn with_chain(mut self, url: &str, chain: Vec<Exchange>) -> Self {
        self.gets.insert(url.to_string(), chain);
        self
    }

    pub fn with_head(mut self, url: &str, content_type: &str) -> Self {
        self.heads.insert(
            url.to_string(),
            vec![exchange("HEAD", url, 200, content_type, b"")],
        );
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, method: &str, url: &str) -> Result<Vec<Exchange>> {
        self.calls.lock().unwrap().push(format!("{} {}", method, url));
        if self.failing.iter().any(|u| u == url) {
            return Err(WeirError::Other(format!("connection refused: {}", url)));
        }
        let table = if method == "HEAD" { &self.heads } else { &self.gets };
        Ok(table
            .get(url)
            .cloned()
            .unwrap_or_else(|| vec![exchange(method, url, 404, "text/plain", b"")]))
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn get_until(
        &self,
        url: &str,
        known: &(dyn for<'s> Fn(&'s str) -> bool + Sync),
    ) -> Result<Vec<Exchange>> {
        let mut chain = self.answer("GET", url)?;
        if let Some(hop) = chain.iter().skip(1).position(|e| known(e.url.as_str())) {
            chain.truncate(hop + 1);
        }
        Ok(chain)
    }

    async fn head(&self, url: &str) -> Result<Vec<Exchange>> {
        self.answer("HEAD", url)
    }
}
