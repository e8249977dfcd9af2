use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::errors::WatchError;
use crate::feed::Item;
use crate::store::{write_atomic, WatermarkStore};

/// Watermark persisted as a single JSON object `{title, date_timestamp, url}`.
/// A missing file or `{}` means no watermark.
#[derive(Debug, Clone)]
pub struct JsonWatermarkStore {
    path: PathBuf,
}

impl JsonWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> Result<Option<Item>, WatchError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WatchError::StateCorruption {
                    path: self.path.clone(),
                    details: e.to_string(),
                })
            }
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let value: serde_json::Value =
            serde_json::from_str(trimmed).map_err(|e| self.corrupt(e))?;
        if value.as_object().is_some_and(|o| o.is_empty()) {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| self.corrupt(e))
    }

    fn corrupt(&self, e: serde_json::Error) -> WatchError {
        WatchError::StateCorruption {
            path: self.path.clone(),
            details: e.to_string(),
        }
    }
}

impl WatermarkStore for JsonWatermarkStore {
    fn load(&self) -> Option<Item> {
        match self.read_state() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "watcher", error = %e, "ignoring unreadable watermark");
                None
            }
        }
    }

    fn save(&self, item: &Item) -> Result<(), WatchError> {
        let bytes = serde_json::to_vec(item)
            .map_err(|e| WatchError::persistence("watermark", e.into()))?;
        write_atomic(&self.path, &bytes).map_err(|e| WatchError::persistence("watermark", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_empty_and_blank_mean_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonWatermarkStore::new(dir.path().join("last_news.json"));
        assert!(store.load().is_none());

        fs::write(store.path(), "{}").unwrap();
        assert!(store.load().is_none());

        fs::write(store.path(), "  \n").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn corrupt_file_is_none_and_repaired_by_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonWatermarkStore::new(dir.path().join("last_news.json"));
        fs::write(store.path(), "{\"title\": \"half").unwrap();
        assert!(matches!(
            store.read_state(),
            Err(WatchError::StateCorruption { .. })
        ));
        assert!(store.load().is_none());

        let it = Item::new("Delisting", 1_700_000_500, "https://x.test/d");
        store.save(&it).unwrap();
        assert_eq!(store.load(), Some(it));
    }

    #[test]
    fn file_uses_wire_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonWatermarkStore::new(dir.path().join("s/last_news.json"));
        store.save(&Item::new("A", 1000, "https://x.test/a")).unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(v["title"], "A");
        assert_eq!(v["date_timestamp"], 1000);
        assert_eq!(v["url"], "https://x.test/a");
    }
}
