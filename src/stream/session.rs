//! Capture of a kept-open connection.
//!
//! Units (one JSON document per line) are buffered and written out as a
//! segment series: the first segment of a file is a request/response pair,
//! later ones are continuations pointing back at that response. A series
//! ends when the file is rotated, the connection is replaced, or the session
//! closes; its last continuation carries the total payload length.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::de::IgnoredAny;
use tracing::{debug, error, info, warn};

use crate::app::{Result, WeirError};
use crate::capture::{capture_path, create_warc, CaptureRecord, CaptureWriter, RecordId, WarcWriter};
use crate::fetcher::TraceReconstructor;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub collection: String,
    pub stream_name: String,
    pub data_path: PathBuf,
    pub url: String,
    /// Files older than this are closed and a new one started.
    pub rotate_every: Duration,
    /// Units buffered before a segment is written.
    pub units_per_record: usize,
    /// Expose closed files under `<data_path>/<stream_name>/` for replay.
    pub seed: bool,
}

/// The request and response header blocks that opened a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub url: String,
    pub request_header: String,
    pub response_header: String,
}

impl Handshake {
    pub fn new(
        url: impl Into<String>,
        request_header: impl Into<String>,
        response_header: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            request_header: request_header.into(),
            response_header: response_header.into(),
        }
    }

    /// Rebuilds the handshake from a debug trace of the connection attempt.
    /// The trace must hold exactly one exchange.
    pub fn from_trace(url: &str, trace: &str) -> Result<Self> {
        let mut pairs = TraceReconstructor::parse(trace)?;
        if pairs.len() != 1 {
            return Err(WeirError::Trace(format!(
                "expected one exchange in stream handshake, found {}",
                pairs.len()
            )));
        }
        let pair = pairs.remove(0);
        Ok(Self::new(url, pair.request_header, pair.response_header))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub files: usize,
    pub records: usize,
    pub units: usize,
    pub malformed: usize,
    pub bytes: u64,
}

impl std::fmt::Display for StreamStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} units ({} bytes, {} malformed) in {} records across {} files",
            self.units, self.bytes, self.malformed, self.records, self.files
        )
    }
}

struct OpenFile {
    writer: WarcWriter,
    path: PathBuf,
    period_start: Instant,
}

struct Series {
    handshake: Handshake,
    origin: Option<RecordId>,
    segment: u32,
    total_length: u64,
}

impl Series {
    fn new(handshake: Handshake) -> Self {
        Self {
            handshake,
            origin: None,
            segment: 0,
            total_length: 0,
        }
    }

    fn reset(&mut self) {
        self.origin = None;
        self.segment = 0;
        self.total_length = 0;
    }
}

/// Single-writer state machine for one connection at a time.
pub struct StreamSession {
    config: StreamConfig,
    file: Option<OpenFile>,
    series: Option<Series>,
    buffer: Vec<u8>,
    units: usize,
    stats: StreamStats,
    closed: bool,
}

impl StreamSession {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            file: None,
            series: None,
            buffer: Vec::new(),
            units: 0,
            stats: StreamStats::default(),
            closed: false,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Path of the file currently being written, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    pub fn on_connect(&mut self, handshake: Handshake) -> Result<()> {
        self.on_connect_at(handshake, Instant::now())
    }

    /// Ends whatever series is in progress and starts a new file for the
    /// new connection.
    pub fn on_connect_at(&mut self, handshake: Handshake, now: Instant) -> Result<()> {
        if self.closed {
            return Err(WeirError::Stream("session already closed".to_string()));
        }
        info!(stream = %self.config.stream_name, url = %handshake.url, "Connected");

        self.flush_series(true)?;
        self.close_file()?;
        self.series = Some(Series::new(handshake));
        self.open_file(now)
    }

    pub fn on_data(&mut self, unit: &[u8]) -> Result<()> {
        self.on_data_at(unit, Instant::now())
    }

    pub fn on_data_at(&mut self, unit: &[u8], now: Instant) -> Result<()> {
        if self.closed {
            return Err(WeirError::Stream("session already closed".to_string()));
        }
        if self.series.is_none() {
            return Err(WeirError::Stream("data received before connect".to_string()));
        }

        let expired = self
            .file
            .as_ref()
            .is_some_and(|f| now.duration_since(f.period_start) >= self.config.rotate_every);
        if expired {
            debug!(stream = %self.config.stream_name, "Rotating capture file");
            self.flush_series(true)?;
            self.close_file()?;
            self.open_file(now)?;
        }

        let unit = unit.strip_suffix(b"\r").unwrap_or(unit);
        if unit.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        if let Err(e) = serde_json::from_slice::<IgnoredAny>(unit) {
            warn!(
                stream = %self.config.stream_name,
                "Skipping malformed unit: {} ({})",
                String::from_utf8_lossy(unit),
                e
            );
            self.stats.malformed += 1;
            return Ok(());
        }

        self.buffer.extend_from_slice(unit);
        self.buffer.extend_from_slice(b"\r\n");
        self.units += 1;
        self.stats.units += 1;

        if self.units >= self.config.units_per_record.max(1) {
            self.flush_series(false)?;
        }
        Ok(())
    }

    /// Transport failure. Logged, then the session is closed.
    pub fn on_error(&mut self, reason: &str) -> Result<()> {
        error!(stream = %self.config.stream_name, "Stream error: {}", reason);
        self.close()
    }

    /// The server ended the connection. Logged, then the session is closed.
    pub fn on_disconnect(&mut self, reason: &str) -> Result<()> {
        warn!(stream = %self.config.stream_name, "Disconnected: {}", reason);
        self.close()
    }

    /// Writes the final series and releases the file. Safe to call twice.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let flushed = self.flush_series(true);
        let closed = self.close_file();
        self.series = None;
        info!(stream = %self.config.stream_name, stats = %self.stats, "Stream session closed");
        flushed.and(closed)
    }

    fn open_file(&mut self, now: Instant) -> Result<()> {
        let path = capture_path(
            &self.config.data_path,
            &self.config.collection,
            Some(&self.config.stream_name),
            Utc::now(),
        );
        let writer = create_warc(path.clone(), &self.config.collection)?;
        info!(path = %path.display(), "Opened stream capture");
        self.stats.records += 1;
        self.file = Some(OpenFile {
            writer,
            path,
            period_start: now,
        });
        Ok(())
    }

    fn close_file(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.writer.close()?;
        self.stats.files += 1;
        debug!(path = %file.path.display(), "Closed stream capture");

        if self.config.seed {
            let alias_dir = self.config.data_path.join(&self.config.stream_name);
            link_alias(&file.path, &alias_dir)?;
        }
        Ok(())
    }

    /// Writes buffered units as the next segment. A final flush terminates
    /// the series; one with nothing written and nothing buffered is a no-op.
    fn flush_series(&mut self, last: bool) -> Result<()> {
        let (Some(series), Some(file)) = (self.series.as_mut(), self.file.as_mut()) else {
            return Ok(());
        };
        let payload = std::mem::take(&mut self.buffer);
        self.units = 0;
        let url = series.handshake.url.clone();

        match series.origin {
            None if payload.is_empty() && last => return Ok(()),
            None => {
                series.total_length += payload.len() as u64;
                let request = CaptureRecord::request(&url, series.handshake.request_header.clone());
                let mut response = CaptureRecord::response(
                    &url,
                    series.handshake.response_header.clone(),
                    payload,
                    &request,
                );
                if !last {
                    response = response.with_segment_number(1);
                    series.origin = Some(response.id);
                    series.segment = 1;
                }
                debug!(url = %url, id = %response.id, last, "Writing first segment");
                file.writer.write(&request)?;
                file.writer.write(&response)?;
                self.stats.records += 2;
            }
            Some(origin) => {
                series.segment += 1;
                series.total_length += payload.len() as u64;
                let mut record = CaptureRecord::continuation(&url, payload, origin, series.segment);
                if last {
                    record = record.with_total_length(series.total_length);
                }
                debug!(
                    url = %url,
                    segment = series.segment,
                    total_length = series.total_length,
                    last,
                    "Writing continuation"
                );
                file.writer.write(&record)?;
                self.stats.records += 1;
            }
        }

        if last {
            self.stats.bytes += series.total_length;
            series.reset();
        }
        Ok(())
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                error!(stream = %self.config.stream_name, "Failed to close stream session: {}", e);
            }
        }
    }
}

/// Points `<alias_dir>/<file name>` at `path`.
fn link_alias(path: &Path, alias_dir: &Path) -> Result<()> {
    let Some(name) = path.file_name() else {
        return Err(WeirError::Stream(format!("no file name in {}", path.display())));
    };
    fs::create_dir_all(alias_dir)?;
    let target = fs::canonicalize(path)?;
    let alias = alias_dir.join(name);
    debug!(alias = %alias.display(), target = %target.display(), "Linking stream seed");

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, &alias)?;

    #[cfg(windows)]
    std::os::windows::fs::symlink_file(&target, &alias)?;

    Ok(())
}
