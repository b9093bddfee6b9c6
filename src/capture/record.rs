use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::app::{Result, WeirError};

/// Identity of a capture record, rendered as `<urn:uuid:...>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<urn:uuid:{}>", self.0)
    }
}

impl FromStr for RecordId {
    type Err = WeirError;

    fn from_str(s: &str) -> Result<Self> {
        let inner = s
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>')
            .trim_start_matches("urn:uuid:");
        Uuid::parse_str(inner)
            .map(RecordId)
            .map_err(|e| WeirError::Capture(format!("bad record id {}: {}", s, e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Warcinfo,
    Request,
    Response,
    Continuation,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Warcinfo => "warcinfo",
            RecordType::Request => "request",
            RecordType::Response => "response",
            RecordType::Continuation => "continuation",
        }
    }

    pub fn content_type(self) -> Option<&'static str> {
        match self {
            RecordType::Warcinfo => Some("application/warc-fields"),
            RecordType::Request => Some("application/http; msgtype=request"),
            RecordType::Response => Some("application/http; msgtype=response"),
            RecordType::Continuation => None,
        }
    }
}

impl FromStr for RecordType {
    type Err = WeirError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "warcinfo" => Ok(RecordType::Warcinfo),
            "request" => Ok(RecordType::Request),
            "response" => Ok(RecordType::Response),
            "continuation" => Ok(RecordType::Continuation),
            other => Err(WeirError::Capture(format!(
                "unsupported record type: {}",
                other
            ))),
        }
    }
}

/// Segment metadata for records that spread one response over several records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    /// 1-based position within the series.
    pub number: u32,
    /// The response record that began the series; absent on the first segment.
    pub origin_id: Option<RecordId>,
    /// Cumulative payload length, only on the terminating continuation.
    pub total_length: Option<u64>,
}

/// One archived unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    pub id: RecordId,
    pub record_type: RecordType,
    pub target_uri: Option<String>,
    pub date: DateTime<Utc>,
    /// Raw HTTP header block, each line terminated by CRLF.
    pub http_header: Option<String>,
    pub body: Option<Vec<u8>>,
    pub concurrent_to: Option<RecordId>,
    pub segment: Option<Segment>,
}

impl CaptureRecord {
    fn base(record_type: RecordType, target_uri: Option<String>) -> Self {
        Self {
            id: RecordId::new(),
            record_type,
            target_uri,
            date: Utc::now(),
            http_header: None,
            body: None,
            concurrent_to: None,
            segment: None,
        }
    }

    pub fn warcinfo(fields: &[(&str, &str)]) -> Self {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(name);
            body.push_str(": ");
            body.push_str(value);
            body.push_str("\r\n");
        }
        let mut record = Self::base(RecordType::Warcinfo, None);
        record.body = Some(body.into_bytes());
        record
    }

    pub fn request(url: &str, http_header: impl Into<String>) -> Self {
        let mut record = Self::base(RecordType::Request, Some(url.to_string()));
        record.http_header = Some(http_header.into());
        record
    }

    /// A response linked to the request that preceded it.
    pub fn response(
        url: &str,
        http_header: impl Into<String>,
        body: Vec<u8>,
        request: &CaptureRecord,
    ) -> Self {
        let mut record = Self::base(RecordType::Response, Some(url.to_string()));
        record.http_header = Some(http_header.into());
        record.body = Some(body);
        record.concurrent_to = Some(request.id);
        record
    }

    pub fn continuation(url: &str, body: Vec<u8>, origin: RecordId, number: u32) -> Self {
        let mut record = Self::base(RecordType::Continuation, Some(url.to_string()));
        record.body = Some(body);
        record.segment = Some(Segment {
            number,
            origin_id: Some(origin),
            total_length: None,
        });
        record
    }

    pub fn with_segment_number(mut self, number: u32) -> Self {
        let segment = self.segment.get_or_insert_with(Segment::default);
        segment.number = number;
        self
    }

    pub fn with_total_length(mut self, total: u64) -> Self {
        let segment = self.segment.get_or_insert_with(Segment::default);
        segment.total_length = Some(total);
        self
    }

    /// The record block: header block, blank line, then body.
    pub fn block(&self) -> Vec<u8> {
        let mut block = Vec::new();
        if let Some(ref header) = self.http_header {
            block.extend_from_slice(header.as_bytes());
            block.extend_from_slice(b"\r\n");
        }
        if let Some(ref body) = self.body {
            block.extend_from_slice(body);
        }
        block
    }

    /// Splits a block read back from a container into header and body.
    pub fn split_block(record_type: RecordType, block: Vec<u8>) -> (Option<String>, Option<Vec<u8>>) {
        match record_type {
            RecordType::Request | RecordType::Response => {
                match block.windows(4).position(|w| w == b"\r\n\r\n") {
                    Some(pos) => {
                        let header = String::from_utf8_lossy(&block[..pos + 2]).into_owned();
                        let body = block[pos + 4..].to_vec();
                        (Some(header), if body.is_empty() { None } else { Some(body) })
                    }
                    None => (Some(String::from_utf8_lossy(&block).into_owned()), None),
                }
            }
            RecordType::Warcinfo | RecordType::Continuation => (None, Some(block)),
        }
    }

    pub fn payload_len(&self) -> usize {
        self.body.as_ref().map_or(0, |b| b.len())
    }
}
