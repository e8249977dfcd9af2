// src/store/mod.rs
//! Durable state behind the novelty decision: the watermark, the history ring
//! and the CSV record log. All writes are blocking `std::fs` calls so a
//! cancelled poll can never interrupt one half-way.

pub mod history;
pub mod memory;
pub mod records;
pub mod watermark;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::errors::WatchError;
use crate::feed::Item;

pub use history::JsonHistoryRing;
pub use records::CsvRecordSink;
pub use watermark::JsonWatermarkStore;

/// The single most recent confirmed item.
pub trait WatermarkStore: Send + Sync {
    /// Absent or unreadable state means "no watermark".
    fn load(&self) -> Option<Item>;
    /// Full overwrite; readers never observe a partial record.
    fn save(&self, item: &Item) -> Result<(), WatchError>;
}

/// Bounded, most-recent-first list of emitted identifiers. Advisory only.
pub trait HistoryStore: Send + Sync {
    fn ensure_initialized(&self) -> Result<(), WatchError>;
    fn load(&self) -> Vec<String>;
    fn push(&self, id: &str) -> Result<(), WatchError>;
}

/// Append-only log of every emitted item.
pub trait RecordSink: Send + Sync {
    fn ensure_initialized(&self) -> Result<(), WatchError>;
    fn append(&self, item: &Item) -> Result<(), WatchError>;
    /// True when `item` is exactly the last row written. Lets a restart finish
    /// an item whose row landed but whose watermark save did not.
    fn is_last(&self, item: &Item) -> bool;
}

/// Write `bytes` next to `path`, fsync, then rename over it.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    ensure_parent(path)?;
    let tmp = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}

pub(crate) fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}
