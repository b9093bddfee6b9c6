pub mod record;
pub mod warc;

use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::Result;

pub use record::{CaptureRecord, RecordId, RecordType, Segment};
pub use warc::{WarcReader, WarcWriter};

/// Append-only sink for capture records.
pub trait CaptureWriter: Send {
    fn write(&mut self, record: &CaptureRecord) -> Result<()>;

    /// Finalizes the container. Calling it more than once is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Accepts and discards every record. Used for dry runs.
#[derive(Debug, Default)]
pub struct DryRunWriter {
    discarded: usize,
}

impl DryRunWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

impl CaptureWriter for DryRunWriter {
    fn write(&mut self, record: &CaptureRecord) -> Result<()> {
        debug!(
            record_type = record.record_type.as_str(),
            uri = record.target_uri.as_deref().unwrap_or("-"),
            "Dry run, discarding record"
        );
        self.discarded += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        info!(discarded = self.discarded, "Dry run, no capture file written");
        Ok(())
    }
}

/// What a [`MemoryWriter`] has seen, shared with whoever holds the handle.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryCapture {
    pub records: Vec<CaptureRecord>,
    pub closes: usize,
}

/// Keeps records in memory behind a shared handle so they can be inspected
/// after the writer has been handed off.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    shared: Arc<Mutex<MemoryCapture>>,
}

#[cfg(test)]
impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Arc<Mutex<MemoryCapture>> {
        Arc::clone(&self.shared)
    }
}

#[cfg(test)]
impl CaptureWriter for MemoryWriter {
    fn write(&mut self, record: &CaptureRecord) -> Result<()> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.records.push(record.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.closes += 1;
        Ok(())
    }
}

/// Builds `<data_path>/YYYY/MM/DD/HH/<collection>[-<stream>]-<timestamp>-<suffix>.warc`.
pub fn capture_path(
    data_path: &Path,
    collection: &str,
    stream: Option<&str>,
    now: DateTime<Utc>,
) -> PathBuf {
    let suffix = Uuid::new_v4().simple().to_string();
    let mut name = collection.to_string();
    if let Some(stream) = stream {
        name.push('-');
        name.push_str(stream);
    }
    let file_name = format!("{}-{}-{}.warc", name, now.format("%Y%m%d%H%M%S"), &suffix[..8]);

    data_path
        .join(now.format("%Y").to_string())
        .join(now.format("%m").to_string())
        .join(now.format("%d").to_string())
        .join(now.format("%H").to_string())
        .join(file_name)
}

/// Fields for the `warcinfo` record at the head of every file.
pub fn warcinfo_fields(collection: &str) -> Vec<(&'static str, String)> {
    vec![
        ("software", format!("weir/{}", env!("CARGO_PKG_VERSION"))),
        ("format", "WARC File Format 1.0".to_string()),
        ("isPartOf", collection.to_string()),
    ]
}

/// Opens a WARC file for `collection`, or a discarding writer for dry runs.
pub fn open_writer(
    data_path: &Path,
    collection: &str,
    stream: Option<&str>,
    dry_run: bool,
) -> Result<Box<dyn CaptureWriter>> {
    if dry_run {
        return Ok(Box::new(DryRunWriter::new()));
    }
    let path = capture_path(data_path, collection, stream, Utc::now());
    Ok(Box::new(create_warc(path, collection)?))
}

/// Creates a WARC file headed by the collection's `warcinfo` record.
pub fn create_warc(path: PathBuf, collection: &str) -> Result<WarcWriter> {
    let fields = warcinfo_fields(collection);
    let info: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
    WarcWriter::create(path, &info)
}
