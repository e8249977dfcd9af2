// src/feed/types.rs
use serde::{Deserialize, Serialize};

use crate::errors::WatchError;

/// A single announcement as seen by the watcher.
///
/// Novelty is decided on `(published_at, title)` only; `url` is the absolute
/// reference and doubles as the identifier kept in the history ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    #[serde(rename = "date_timestamp")]
    pub published_at: i64, // unix seconds
    pub url: String,
}

impl Item {
    pub fn new(title: impl Into<String>, published_at: i64, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            published_at,
            url: url.into(),
        }
    }

    /// Build an item from a feed hit whose `url` is a path relative to `base_url`.
    pub fn from_path(title: impl Into<String>, published_at: i64, base_url: &str, path: &str) -> Self {
        Self::new(title, published_at, join_url(base_url, path))
    }

    pub fn id(&self) -> &str {
        &self.url
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// A paginated announcement feed. Page 0 is the live (newest) page and every
/// page is returned newest-first, the way the upstream API serves it.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Vec<Item>, WatchError>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_slashes() {
        let base = "https://announcements.bybit.com/en-US";
        assert_eq!(
            join_url(base, "/article/listing-abc/"),
            "https://announcements.bybit.com/en-US/article/listing-abc/"
        );
        assert_eq!(
            join_url("https://x.test/", "article/1"),
            "https://x.test/article/1"
        );
        assert_eq!(join_url(base, "https://other.test/a"), "https://other.test/a");
    }

    #[test]
    fn serde_uses_wire_field_names() {
        let it = Item::new("Listing", 1_700_000_000, "https://x.test/a");
        let json = serde_json::to_value(&it).unwrap();
        assert_eq!(json["date_timestamp"], 1_700_000_000);
        assert_eq!(json["title"], "Listing");
        assert!(json.get("published_at").is_none());
    }
}
