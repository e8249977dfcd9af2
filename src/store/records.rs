use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::DateTime;

use crate::errors::WatchError;
use crate::feed::Item;
use crate::store::{ensure_parent, RecordSink};

pub const HEADER: [&str; 3] = ["title", "date_timestamp", "url"];

const LINE_END: &str = "\r\n";

// enough for any realistic last row
const TAIL_BYTES: u64 = 16 * 1024;

/// Render unix seconds as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn render_timestamp(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn encode_row(fields: &[&str]) -> String {
    let mut line = fields
        .iter()
        .map(|f| quote_field(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str(LINE_END);
    line
}

fn item_row(item: &Item) -> Option<String> {
    let ts = render_timestamp(item.published_at)?;
    Some(encode_row(&[item.title.as_str(), ts.as_str(), item.url.as_str()]))
}

/// CSV log of emitted items, always headed by `title,date_timestamp,url`.
#[derive(Debug, Clone)]
pub struct CsvRecordSink {
    path: PathBuf,
}

impl CsvRecordSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header_matches(&self) -> io::Result<bool> {
        let f = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        let mut first = String::new();
        BufReader::new(f).read_line(&mut first)?;
        Ok(first.trim_end_matches(['\r', '\n']) == HEADER.join(","))
    }

    /// True when the file ends with `row` as a whole record. Matches on the
    /// raw tail so quoted fields spanning several lines compare intact.
    fn ends_with_row(&self, row: &str) -> io::Result<bool> {
        let mut f = fs::File::open(&self.path)?;
        let len = f.metadata()?.len();
        let start = len.saturating_sub(TAIL_BYTES);
        f.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        let tail = String::from_utf8_lossy(&buf);

        let tail = tail.trim_end_matches(['\r', '\n']);
        let record = row.trim_end_matches(LINE_END);
        let Some(before) = tail.strip_suffix(record) else {
            return Ok(false);
        };
        Ok(before.ends_with('\n') || (before.is_empty() && start == 0))
    }

    fn write_header(&self) -> io::Result<()> {
        ensure_parent(&self.path)?;
        fs::write(&self.path, encode_row(&HEADER))
    }
}

impl RecordSink for CsvRecordSink {
    fn ensure_initialized(&self) -> Result<(), WatchError> {
        let ok = match self.header_matches() {
            Ok(ok) => ok,
            // unreadable (e.g. not UTF-8) is repaired like a wrong header
            Err(e) if e.kind() == ErrorKind::InvalidData => false,
            Err(e) => return Err(WatchError::persistence("record sink", e)),
        };
        if !ok {
            tracing::info!(target: "watcher", path = %self.path.display(), "writing record header");
            self.write_header()
                .map_err(|e| WatchError::persistence("record sink", e))?;
        }
        Ok(())
    }

    fn append(&self, item: &Item) -> Result<(), WatchError> {
        let row = item_row(item).ok_or_else(|| {
            WatchError::persistence(
                "record sink",
                io::Error::new(
                    ErrorKind::InvalidData,
                    format!("timestamp {} out of range", item.published_at),
                ),
            )
        })?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| WatchError::persistence("record sink", e))?;
        f.write_all(row.as_bytes())
            .and_then(|_| f.flush())
            .map_err(|e| WatchError::persistence("record sink", e))
    }

    fn is_last(&self, item: &Item) -> bool {
        let Some(row) = item_row(item) else {
            return false;
        };
        self.ends_with_row(&row).unwrap_or(false)
    }
}
