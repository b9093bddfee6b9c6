//! Rebuilds request/response header blocks from a line-oriented HTTP debug
//! trace.
//!
//! Some client libraries only expose the socket exchange as text:
//!
//! ```text
//! send: b'GET /a HTTP/1.1\r\nHost: example.com\r\n\r\n'
//! reply: 'HTTP/1.1 301 Moved Permanently\r\n'
//! header: Location: /b
//! send: b'GET /b HTTP/1.1\r\nHost: example.com\r\n\r\n'
//! reply: 'HTTP/1.1 200 OK\r\n'
//! header: Content-Type: text/html
//! ```
//!
//! The trace carries no resolved URLs or bodies, so the pairs it yields are
//! matched positionally against the responses the caller actually observed.

use crate::app::{Result, WeirError};
use crate::capture::CaptureRecord;

const METHODS: &[&str] = &["GET", "POST", "HEAD", "PUT", "DELETE", "PATCH", "OPTIONS"];

/// A request header block and the response header block that answered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPair {
    pub method: String,
    pub target: String,
    pub request_header: String,
    pub response_header: String,
}

#[derive(Debug)]
enum State {
    Idle,
    Requested {
        method: String,
        target: String,
        request_header: String,
    },
    Responding {
        method: String,
        target: String,
        request_header: String,
        response_header: String,
    },
}

#[derive(Debug)]
pub struct TraceReconstructor {
    state: State,
    pairs: Vec<HeaderPair>,
}

impl Default for TraceReconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceReconstructor {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            pairs: Vec::new(),
        }
    }

    /// Parses a whole trace.
    pub fn parse(trace: &str) -> Result<Vec<HeaderPair>> {
        let mut reconstructor = Self::new();
        for line in trace.lines() {
            reconstructor.push_line(line)?;
        }
        reconstructor.finish()
    }

    pub fn push_line(&mut self, line: &str) -> Result<()> {
        if let Some(rest) = line.strip_prefix("send:") {
            self.on_send(&unquote(rest))
        } else if let Some(rest) = line.strip_prefix("reply:") {
            self.on_reply(&unquote(rest))
        } else if let Some(rest) = line.strip_prefix("header:") {
            self.on_header(rest)
        } else {
            Ok(())
        }
    }

    fn on_send(&mut self, data: &str) -> Result<()> {
        let Some((method, target)) = request_line(data) else {
            // Request bodies are traced as separate sends.
            return match self.state {
                State::Requested { .. } => Ok(()),
                _ => Err(WeirError::Trace(format!(
                    "outbound data without a request line: {:?}",
                    data
                ))),
            };
        };

        let previous = std::mem::replace(
            &mut self.state,
            State::Requested {
                method,
                target,
                request_header: header_block(data),
            },
        );
        match previous {
            State::Idle => Ok(()),
            State::Requested { target, .. } => Err(WeirError::Trace(format!(
                "request for {} has no reply",
                target
            ))),
            State::Responding {
                method,
                target,
                request_header,
                response_header,
            } => {
                self.pairs.push(HeaderPair {
                    method,
                    target,
                    request_header,
                    response_header,
                });
                Ok(())
            }
        }
    }

    fn on_reply(&mut self, data: &str) -> Result<()> {
        let status_line = format!("{}\r\n", data.trim_end_matches(['\r', '\n']));
        let previous = std::mem::replace(&mut self.state, State::Idle);
        self.state = match previous {
            State::Idle => {
                return Err(WeirError::Trace("reply without a request".into()));
            }
            // An interim reply (100 Continue) is superseded by the real one.
            State::Requested {
                method,
                target,
                request_header,
            }
            | State::Responding {
                method,
                target,
                request_header,
                ..
            } => State::Responding {
                method,
                target,
                request_header,
                response_header: status_line,
            },
        };
        Ok(())
    }

    fn on_header(&mut self, data: &str) -> Result<()> {
        match self.state {
            State::Responding {
                ref mut response_header,
                ..
            } => {
                response_header.push_str(data.trim().trim_end_matches("\\r\\n"));
                response_header.push_str("\r\n");
                Ok(())
            }
            _ => Err(WeirError::Trace(format!(
                "header line outside a reply: {:?}",
                data.trim()
            ))),
        }
    }

    /// Flushes the open response. A request that never saw a reply is an error.
    pub fn finish(mut self) -> Result<Vec<HeaderPair>> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {}
            State::Requested { target, .. } => {
                return Err(WeirError::Trace(format!(
                    "request for {} has no reply",
                    target
                )));
            }
            State::Responding {
                method,
                target,
                request_header,
                response_header,
            } => self.pairs.push(HeaderPair {
                method,
                target,
                request_header,
                response_header,
            }),
        }
        Ok(self.pairs)
    }
}

/// Strips the `b'...'` / `'...'` quoting and expands escaped CRLFs.
fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw.strip_prefix('b').filter(|r| r.starts_with(['\'', '"'])).unwrap_or(raw);
    let raw = raw
        .strip_prefix(['\'', '"'])
        .and_then(|r| r.strip_suffix(['\'', '"']))
        .unwrap_or(raw);
    raw.replace("\\r\\n", "\r\n")
}

fn request_line(data: &str) -> Option<(String, String)> {
    let start = METHODS
        .iter()
        .filter_map(|m| data.find(&format!("{} ", m)))
        .min()?;
    let line = data[start..].lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    Some((method, target))
}

/// Header block from the first request line to the blank line, CRLF terminated.
fn header_block(data: &str) -> String {
    let start = METHODS
        .iter()
        .filter_map(|m| data.find(&format!("{} ", m)))
        .min()
        .unwrap_or(0);
    let head = &data[start..];
    let head = head.split("\r\n\r\n").next().unwrap_or(head);
    let mut block = head.trim_end_matches(['\r', '\n']).to_string();
    block.push_str("\r\n");
    block
}

/// What the client library reported for one hop: the resolved URL and body.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedResponse {
    pub url: String,
    pub body: Vec<u8>,
}

/// Pairs reconstructed headers with observed responses, hop by hop, and
/// builds request/response records from them.
pub fn pair_with_responses(
    pairs: &[HeaderPair],
    observed: &[ObservedResponse],
) -> Result<Vec<CaptureRecord>> {
    if pairs.len() != observed.len() {
        return Err(WeirError::Trace(format!(
            "trace has {} exchanges but {} responses were observed",
            pairs.len(),
            observed.len()
        )));
    }

    let mut records = Vec::with_capacity(pairs.len() * 2);
    for (pair, response) in pairs.iter().zip(observed) {
        let request = CaptureRecord::request(&response.url, pair.request_header.clone());
        let reply = CaptureRecord::response(
            &response.url,
            pair.response_header.clone(),
            response.body.clone(),
            &request,
        );
        records.push(request);
        records.push(reply);
    }
    Ok(records)
}
