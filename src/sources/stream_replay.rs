use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::app::Result;
use crate::capture::{RecordType, WarcReader};
use crate::domain::{FetchOutcome, Fetchable};
use crate::sources::links::item_links;

/// A capture written by a streaming session, mined for links after the
/// connection that produced it has moved on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCapture {
    pub path: PathBuf,
}

impl StreamCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads every payload line as a JSON item. With `remove_alias`, an alias
    /// is removed once it has been read, whether or not reading succeeded.
    pub async fn fetch(&self, remove_alias: bool) -> Result<FetchOutcome> {
        let mined = mine(&self.path);

        let is_alias = fs::symlink_metadata(&self.path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_alias && !remove_alias {
            debug!(path = %self.path.display(), "Dry run, keeping stream alias");
        } else if is_alias {
            debug!(path = %self.path.display(), "Removing stream alias");
            fs::remove_file(&self.path)?;
        }

        Ok(FetchOutcome::new(Vec::new(), mined?))
    }
}

fn mine(path: &Path) -> Result<Vec<Fetchable>> {
    debug!(path = %path.display(), "Opening stream capture");
    let mut links = Vec::new();

    for record in WarcReader::open(path)? {
        let record = record?;
        if !matches!(
            record.record_type,
            RecordType::Response | RecordType::Continuation
        ) {
            continue;
        }
        let Some(body) = record.body else {
            continue;
        };

        for line in body.split(|b| *b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Value>(line) {
                Ok(item) => links.extend(item_links(&item)),
                Err(e) => warn!(
                    path = %path.display(),
                    "Malformed item: {} ({})",
                    String::from_utf8_lossy(line),
                    e
                ),
            }
        }
    }
    Ok(links)
}
