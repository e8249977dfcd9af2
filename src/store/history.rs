use std::collections::VecDeque;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::WatchError;
use crate::store::{write_atomic, HistoryStore};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RingFile {
    last_news: Vec<String>,
}

/// Ring of the last `cap` emitted urls, stored as `{"last_news": [...]}`,
/// most recent first.
#[derive(Debug)]
pub struct JsonHistoryRing {
    path: PathBuf,
    cap: usize,
    // serializes read-modify-write of the file within this process
    guard: Mutex<()>,
}

impl JsonHistoryRing {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap: cap.max(1),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    fn read_ring(&self) -> Result<Option<Vec<String>>, WatchError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => serde_json::from_str::<RingFile>(&s)
                .map(|f| Some(f.last_news))
                .map_err(|e| WatchError::StateCorruption {
                    path: self.path.clone(),
                    details: e.to_string(),
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WatchError::StateCorruption {
                path: self.path.clone(),
                details: e.to_string(),
            }),
        }
    }

    fn write_ring(&self, entries: Vec<String>) -> Result<(), WatchError> {
        let bytes = serde_json::to_vec(&RingFile { last_news: entries })
            .map_err(|e| WatchError::persistence("history ring", e.into()))?;
        write_atomic(&self.path, &bytes).map_err(|e| WatchError::persistence("history ring", e))
    }

    fn load_unlocked(&self) -> Vec<String> {
        match self.read_ring() {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(target: "watcher", error = %e, "treating history ring as empty");
                Vec::new()
            }
        }
    }
}

/// Insert at the head, evicting from the tail so at most `cap` entries remain.
pub(crate) fn push_front_bounded(entries: Vec<String>, id: &str, cap: usize) -> Vec<String> {
    let mut ring: VecDeque<String> = entries.into();
    while ring.len() >= cap {
        ring.pop_back();
    }
    ring.push_front(id.to_string());
    ring.into()
}

impl HistoryStore for JsonHistoryRing {
    fn ensure_initialized(&self) -> Result<(), WatchError> {
        let _g = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        match self.read_ring() {
            Ok(Some(mut entries)) if entries.len() > self.cap => {
                tracing::info!(target: "watcher", kept = self.cap, found = entries.len(), "trimming history ring");
                entries.truncate(self.cap);
                self.write_ring(entries)
            }
            Ok(Some(_)) => Ok(()),
            Ok(None) => self.write_ring(Vec::new()),
            Err(e) => {
                tracing::warn!(target: "watcher", error = %e, "recreating history ring");
                self.write_ring(Vec::new())
            }
        }
    }

    fn load(&self) -> Vec<String> {
        let _g = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        self.load_unlocked()
    }

    fn push(&self, id: &str) -> Result<(), WatchError> {
        let _g = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        let entries = push_front_bounded(self.load_unlocked(), id, self.cap);
        self.write_ring(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_push_keeps_newest_first() {
        let mut v = Vec::new();
        for i in 0..7 {
            v = push_front_bounded(v, &format!("u{i}"), 5);
        }
        assert_eq!(v, vec!["u6", "u5", "u4", "u3", "u2"]);
    }

    #[test]
    fn oversized_file_is_trimmed_on_push() {
        let long: Vec<String> = (0..9).map(|i| format!("old{i}")).collect();
        let v = push_front_bounded(long, "new", 3);
        assert_eq!(v, vec!["new", "old0", "old1"]);
    }

    #[test]
    fn ensure_initialized_recreates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let ring = JsonHistoryRing::new(dir.path().join("last_several_news.json"), 5);
        fs::write(ring.path(), "[not json").unwrap();
        assert!(ring.load().is_empty());

        ring.ensure_initialized().unwrap();
        let raw = fs::read_to_string(ring.path()).unwrap();
        assert_eq!(raw, r#"{"last_news":[]}"#);
    }

    #[test]
    fn ensure_initialized_keeps_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ring = JsonHistoryRing::new(dir.path().join("ring.json"), 5);
        ring.push("https://x.test/1").unwrap();
        ring.ensure_initialized().unwrap();
        assert_eq!(ring.load(), vec!["https://x.test/1".to_string()]);
    }

    #[test]
    fn ensure_initialized_trims_to_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let ring = JsonHistoryRing::new(dir.path().join("ring.json"), 3);
        fs::write(
            ring.path(),
            r#"{"last_news":["u9","u8","u7","u6","u5"]}"#,
        )
        .unwrap();

        ring.ensure_initialized().unwrap();
        assert_eq!(ring.load(), vec!["u9", "u8", "u7"]);
    }
}
