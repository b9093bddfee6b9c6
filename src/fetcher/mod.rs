pub mod http_fetcher;
#[cfg(test)]
pub mod mock;
pub mod trace;

use async_trait::async_trait;

use crate::app::Result;
use crate::capture::CaptureRecord;

pub use http_fetcher::ReqwestClient;
pub use trace::{HeaderPair, ObservedResponse, TraceReconstructor};

/// One request/response hop. A fetch that follows redirects yields one
/// `Exchange` per hop, the final destination last.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub url: String,
    pub method: String,
    /// Request line plus header fields, CRLF terminated.
    pub request_header: String,
    pub status: u16,
    /// Status line plus header fields, CRLF terminated.
    pub response_header: String,
    pub body: Vec<u8>,
}

impl Exchange {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Case-insensitive lookup of a response header field.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_header
            .split("\r\n")
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .find(|(n, _)| n.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// The request record followed by the response record linked to it.
    pub fn to_records(&self) -> [CaptureRecord; 2] {
        let request = CaptureRecord::request(&self.url, self.request_header.clone());
        let response = CaptureRecord::response(
            &self.url,
            self.response_header.clone(),
            self.body.clone(),
            &request,
        );
        [request, response]
    }
}

/// Flattens a redirect chain into request/response record pairs, in order.
pub fn exchanges_to_records(exchanges: &[Exchange]) -> Vec<CaptureRecord> {
    exchanges.iter().flat_map(Exchange::to_records).collect()
}

/// Network access as seen by fetchable items.
///
/// Implementations follow redirects themselves and report every hop so
/// that each can be archived and marked fetched.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<Exchange>> {
        self.get_until(url, &|_: &str| false).await
    }

    /// GET that does not follow a redirect into a locator for which `known`
    /// returns true. The redirect response itself is still returned.
    async fn get_until(
        &self,
        url: &str,
        known: &(dyn for<'s> Fn(&'s str) -> bool + Sync),
    ) -> Result<Vec<Exchange>>;

    async fn head(&self, url: &str) -> Result<Vec<Exchange>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RecordType;

    fn exchange(url: &str, status: u16) -> Exchange {
        Exchange {
            url: url.to_string(),
            method: "GET".into(),
            request_header: format!("GET {} HTTP/1.1\r\n", url),
            status,
            response_header: format!(
                "HTTP/1.1 {} X\r\nContent-Type: text/html; charset=utf-8\r\nX-Thing: a:b\r\n",
                status
            ),
            body: b"<html></html>".to_vec(),
        }
    }

    #[test]
    fn test_header_lookup() {
        let ex = exchange("http://a/", 200);
        assert_eq!(ex.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(ex.header("x-thing"), Some("a:b"));
        assert_eq!(ex.header("missing"), None);
    }

    #[test]
    fn test_status_classes() {
        assert!(exchange("http://a/", 204).is_success());
        assert!(exchange("http://a/", 301).is_redirect());
        assert!(!exchange("http://a/", 404).is_success());
    }

    #[test]
    fn test_redirect_chain_records_pair_up() {
        let chain = vec![exchange("http://a/", 301), exchange("http://b/", 200)];
        let records = exchanges_to_records(&chain);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].record_type, RecordType::Request);
        assert_eq!(records[1].record_type, RecordType::Response);
        assert_eq!(records[1].concurrent_to, Some(records[0].id));
        assert_eq!(records[3].concurrent_to, Some(records[2].id));
        assert_eq!(records[3].target_uri.as_deref(), Some("http://b/"));
    }
}
