use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::config::WatcherConfig;
use crate::errors::WatchError;
use crate::feed::headers::{RandomizedHeaders, RequestDecorator};
use crate::feed::types::{FeedSource, Item};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    title: String,
    date_timestamp: i64,
    url: String,
}

/// Parse a search response body into items, keeping the feed's newest-first order.
pub fn parse_page(body: &str, base_url: &str) -> Result<Vec<Item>, WatchError> {
    let resp: SearchResponse = serde_json::from_str(body.trim())
        .map_err(|e| WatchError::MalformedResponse(format!("decoding search response: {e}")))?;
    let result = resp
        .result
        .ok_or_else(|| WatchError::MalformedResponse("missing `result` object".into()))?;

    Ok(result
        .hits
        .into_iter()
        .map(|h| Item::from_path(h.title, h.date_timestamp, base_url, &h.url))
        .collect())
}

pub struct BybitFeed {
    mode: Mode,
    base_url: String,
}

enum Mode {
    // Owned copy so tests can hand in non-'static bodies.
    Fixture(String),
    Http {
        api_url: String,
        hits_per_page: u32,
        client: reqwest::Client,
        decorator: Arc<dyn RequestDecorator>,
    },
}

impl BybitFeed {
    pub fn from_config(cfg: &WatcherConfig) -> Result<Self, WatchError> {
        let decorator = RandomizedHeaders::new(&cfg.origin, &cfg.accept)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            mode: Mode::Http {
                api_url: cfg.api_url.clone(),
                hits_per_page: cfg.hits_per_page,
                client,
                decorator: Arc::new(decorator),
            },
            base_url: cfg.base_url.clone(),
        })
    }

    /// Swap the header source, e.g. for a fixed header set when debugging upstream.
    pub fn with_decorator(mut self, decorator: Arc<dyn RequestDecorator>) -> Self {
        if let Mode::Http { decorator: d, .. } = &mut self.mode {
            *d = decorator;
        }
        self
    }

    /// Serve every page from a stored response body.
    pub fn from_fixture_str(body: &str, base_url: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl FeedSource for BybitFeed {
    async fn fetch_page(&self, page: u32) -> Result<Vec<Item>, WatchError> {
        match &self.mode {
            Mode::Fixture(body) => parse_page(body, &self.base_url),
            Mode::Http {
                api_url,
                hits_per_page,
                client,
                decorator,
            } => {
                let hits = hits_per_page.to_string();
                let page_s = page.to_string();
                let form = [
                    ("hitsPerPage", hits.as_str()),
                    ("page", page_s.as_str()),
                    ("query", ""),
                ];
                let resp = client
                    .post(api_url.as_str())
                    .headers(decorator.headers())
                    .form(&form)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());
                let body = match resp {
                    Ok(r) => r.text().await,
                    Err(e) => Err(e),
                };
                let body = match body {
                    Ok(b) => b,
                    Err(e) => {
                        counter!("watcher_fetch_errors_total").increment(1);
                        return Err(e.into());
                    }
                };
                parse_page(&body, &self.base_url)
            }
        }
    }

    fn name(&self) -> &'static str {
        "bybit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://announcements.bybit.com/en-US";

    #[test]
    fn parses_hits_in_feed_order() {
        let body = r#"{"ret_code":0,"result":{"hits":[
            {"title":"Newest","date_timestamp":1700000100,"url":"/article/newest/"},
            {"title":"Older","date_timestamp":1700000000,"url":"/article/older/"}
        ],"total":2}}"#;
        let items = parse_page(body, BASE).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Newest");
        assert_eq!(items[0].url, format!("{BASE}/article/newest/"));
        assert_eq!(items[1].published_at, 1_700_000_000);
    }

    #[test]
    fn missing_result_is_malformed() {
        let err = parse_page(r#"{"ret_code":10001}"#, BASE).unwrap_err();
        assert!(matches!(err, WatchError::MalformedResponse(_)));
    }

    #[test]
    fn hit_with_wrong_shape_is_malformed() {
        let body = r#"{"result":{"hits":[{"title":"x","date_timestamp":"soon","url":"/a"}]}}"#;
        assert!(matches!(
            parse_page(body, BASE),
            Err(WatchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn empty_hits_yield_no_items() {
        let items = parse_page(r#"{"result":{}}"#, BASE).unwrap();
        assert!(items.is_empty());
    }
}
