use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::app::{Result, WeirError};
use crate::capture::record::{CaptureRecord, RecordId, RecordType, Segment};
use crate::capture::CaptureWriter;

const WARC_VERSION: &str = "WARC/1.0";

/// Appends capture records to a WARC/1.0 file.
pub struct WarcWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    records_written: usize,
}

impl WarcWriter {
    /// Creates the file (and its parent directories) and writes a leading
    /// `warcinfo` record built from `info`.
    pub fn create<P: Into<PathBuf>>(path: P, info: &[(&str, &str)]) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!(dir = %parent.display(), "Creating capture directory");
                fs::create_dir_all(parent)?;
            }
        }

        info!(path = %path.display(), "Writing to capture file");
        let file = File::create(&path)?;
        let mut writer = Self {
            path,
            out: Some(BufWriter::new(file)),
            records_written: 0,
        };
        writer.write(&CaptureRecord::warcinfo(info))?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn records_written(&self) -> usize {
        self.records_written
    }
}

impl CaptureWriter for WarcWriter {
    fn write(&mut self, record: &CaptureRecord) -> Result<()> {
        let out = self.out.as_mut().ok_or_else(|| {
            WeirError::Capture(format!("{} is already closed", self.path.display()))
        })?;
        out.write_all(&encode_record(record))?;
        self.records_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            debug!(path = %self.path.display(), records = self.records_written, "Closing capture file");
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl Drop for WarcWriter {
    fn drop(&mut self) {
        if let Some(mut out) = self.out.take() {
            if let Err(e) = out.flush() {
                warn!(path = %self.path.display(), "Failed to flush capture file on drop: {}", e);
            }
        }
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Serializes one record in WARC/1.0 framing.
pub fn encode_record(record: &CaptureRecord) -> Vec<u8> {
    let block = record.block();

    let mut head = String::new();
    let mut field = |name: &str, value: &str| {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    };

    field("WARC-Type", record.record_type.as_str());
    field("WARC-Record-ID", &record.id.to_string());
    field("WARC-Date", &format_date(&record.date));
    if let Some(ref uri) = record.target_uri {
        field("WARC-Target-URI", uri);
    }
    if let Some(concurrent) = record.concurrent_to {
        field("WARC-Concurrent-To", &concurrent.to_string());
    }
    if let Some(segment) = record.segment {
        field("WARC-Segment-Number", &segment.number.to_string());
        if let Some(origin) = segment.origin_id {
            field("WARC-Segment-Origin-ID", &origin.to_string());
        }
        if let Some(total) = segment.total_length {
            field("WARC-Segment-Total-Length", &total.to_string());
        }
    }
    field(
        "WARC-Block-Digest",
        &format!("sha256:{}", hex::encode(Sha256::digest(&block))),
    );
    if let Some(content_type) = record.record_type.content_type() {
        field("Content-Type", content_type);
    }
    field("Content-Length", &block.len().to_string());

    let mut out = Vec::with_capacity(WARC_VERSION.len() + head.len() + block.len() + 8);
    out.extend_from_slice(WARC_VERSION.as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&block);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

/// Reads capture records back from a WARC/1.0 stream.
pub struct WarcReader<R: BufRead> {
    inner: R,
}

impl WarcReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> WarcReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn read_record(&mut self) -> Result<Option<CaptureRecord>> {
        let version = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if !version.starts_with("WARC/") {
            return Err(WeirError::Capture(format!(
                "expected WARC version line, found {:?}",
                version
            )));
        }

        let mut fields = Vec::new();
        loop {
            match self.read_line()? {
                None => return Err(WeirError::Capture("truncated record header".into())),
                Some(line) if line.is_empty() => break,
                Some(line) => {
                    let (name, value) = line.split_once(':').ok_or_else(|| {
                        WeirError::Capture(format!("malformed header line {:?}", line))
                    })?;
                    fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
                }
            }
        }
        let get = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        };

        let length: usize = get("content-length")
            .ok_or_else(|| WeirError::Capture("missing Content-Length".into()))?
            .parse()
            .map_err(|_| WeirError::Capture("bad Content-Length".into()))?;
        let mut block = vec![0u8; length];
        self.inner.read_exact(&mut block)?;

        let record_type: RecordType = get("warc-type")
            .ok_or_else(|| WeirError::Capture("missing WARC-Type".into()))?
            .parse()?;
        let id: RecordId = get("warc-record-id")
            .ok_or_else(|| WeirError::Capture("missing WARC-Record-ID".into()))?
            .parse()?;
        let date = match get("warc-date") {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| WeirError::Capture(format!("bad WARC-Date {}: {}", raw, e)))?,
            None => return Err(WeirError::Capture("missing WARC-Date".into())),
        };
        let concurrent_to = get("warc-concurrent-to").map(str::parse).transpose()?;

        let segment = match get("warc-segment-number") {
            Some(number) => Some(Segment {
                number: number
                    .parse()
                    .map_err(|_| WeirError::Capture("bad WARC-Segment-Number".into()))?,
                origin_id: get("warc-segment-origin-id").map(str::parse).transpose()?,
                total_length: get("warc-segment-total-length")
                    .map(|v| {
                        v.parse()
                            .map_err(|_| WeirError::Capture("bad WARC-Segment-Total-Length".into()))
                    })
                    .transpose()?,
            }),
            None => None,
        };

        let (http_header, body) = CaptureRecord::split_block(record_type, block);

        Ok(Some(CaptureRecord {
            id,
            record_type,
            target_uri: get("warc-target-uri").map(String::from),
            date,
            http_header,
            body,
            concurrent_to,
            segment,
        }))
    }
}

impl<R: BufRead> Iterator for WarcReader<R> {
    type Item = Result<CaptureRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}
