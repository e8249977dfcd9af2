// src/config/watcher.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const ENV_CONFIG_PATH: &str = "WATCHER_CONFIG_PATH";
pub const ENV_PAUSE_SECS: &str = "WATCHER_PAUSE_SECS";
pub const ENV_HITS_PER_PAGE: &str = "WATCHER_HITS_PER_PAGE";
pub const ENV_HISTORY_CAPACITY: &str = "WATCHER_HISTORY_CAPACITY";
pub const ENV_METRICS_ADDR: &str = "WATCHER_METRICS_ADDR";

pub const DEFAULT_TOML_PATH: &str = "config/watcher.toml";
pub const DEFAULT_JSON_PATH: &str = "config/watcher.json";

fn default_api_url() -> String {
    "https://api2.bybit.com/announcements/api/search/v1/index/announcement-posts_en-us".into()
}
fn default_origin() -> String {
    "https://announcements.bybit.com".into()
}
fn default_accept() -> String {
    "application/json, text/plain, */*".into()
}
fn default_base_url() -> String {
    "https://announcements.bybit.com/en-US".into()
}
fn default_records_path() -> PathBuf {
    PathBuf::from("static/csv_data.csv")
}
fn default_watermark_path() -> PathBuf {
    PathBuf::from("static/last_news.json")
}
fn default_history_path() -> PathBuf {
    PathBuf::from("static/last_several_news.json")
}
fn default_pause_secs() -> u64 {
    1
}
fn default_hits_per_page() -> u32 {
    8
}
fn default_history_capacity() -> usize {
    5
}
fn default_request_timeout_secs() -> u64 {
    10
}

/// Everything the watcher needs, passed explicitly to each component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatcherConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_accept")]
    pub accept: String,
    /// Prefix joined with each hit's relative `url`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
    #[serde(default = "default_watermark_path")]
    pub watermark_path: PathBuf,
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
    #[serde(default = "default_hits_per_page")]
    pub hits_per_page: u32,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Prometheus listener; disabled when unset.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            origin: default_origin(),
            accept: default_accept(),
            base_url: default_base_url(),
            records_path: default_records_path(),
            watermark_path: default_watermark_path(),
            history_path: default_history_path(),
            pause_secs: default_pause_secs(),
            hits_per_page: default_hits_per_page(),
            history_capacity: default_history_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
            metrics_addr: None,
        }
    }
}

impl WatcherConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading watcher config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing watcher config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Resolve the config file, then apply env overrides:
    /// 1) explicit path (CLI flag)
    /// 2) $WATCHER_CONFIG_PATH
    /// 3) config/watcher.toml
    /// 4) config/watcher.json
    /// 5) built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let base = if let Some(p) = explicit {
            Self::load_from(p)?
        } else if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_TOML_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_TOML_PATH))?
        } else if Path::new(DEFAULT_JSON_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_JSON_PATH))?
        } else {
            Self::default()
        };
        base.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = parse_env::<u64>(ENV_PAUSE_SECS)? {
            self.pause_secs = v;
        }
        if let Some(v) = parse_env::<u32>(ENV_HITS_PER_PAGE)? {
            self.hits_per_page = v;
        }
        if let Some(v) = parse_env::<usize>(ENV_HISTORY_CAPACITY)? {
            self.history_capacity = v;
        }
        if let Some(v) = parse_env::<SocketAddr>(ENV_METRICS_ADDR)? {
            self.metrics_addr = Some(v);
        }
        Ok(self.sanitized())
    }

    fn sanitized(mut self) -> Self {
        // zero would spin STEADY against the upstream API
        if self.pause_secs == 0 {
            tracing::warn!(target: "watcher", "pause_secs = 0 is not allowed, using 1");
            self.pause_secs = 1;
        }
        if self.hits_per_page == 0 {
            self.hits_per_page = default_hits_per_page();
        }
        if self.history_capacity == 0 {
            self.history_capacity = default_history_capacity();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {name}={raw}: {e}")),
        _ => Ok(None),
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<WatcherConfig> {
    // JSON content always starts with an object brace; everything else is tried as TOML.
    let looks_json = hint_ext == "json" || s.trim_start().starts_with('{');
    if looks_json {
        if let Ok(v) = serde_json::from_str::<WatcherConfig>(s) {
            return Ok(v);
        }
    }
    match toml::from_str::<WatcherConfig>(s) {
        Ok(v) => Ok(v),
        Err(toml_err) if !looks_json => {
            serde_json::from_str(s).map_err(|_| anyhow!("unsupported config format: {toml_err}"))
        }
        Err(_) => serde_json::from_str(s).context("parsing JSON config"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_partial_keeps_defaults() {
        let cfg = parse_config("pause_secs = 3\nhistory_capacity = 7\n", "toml").unwrap();
        assert_eq!(cfg.pause_secs, 3);
        assert_eq!(cfg.history_capacity, 7);
        assert_eq!(cfg.hits_per_page, 8);
        assert_eq!(cfg.records_path, PathBuf::from("static/csv_data.csv"));
    }

    #[test]
    fn json_without_extension_is_sniffed() {
        let cfg = parse_config(r#"{"hits_per_page": 20}"#, "").unwrap();
        assert_eq!(cfg.hits_per_page, 20);
    }

    #[test]
    fn zero_capacity_is_sanitized() {
        let cfg = parse_config("history_capacity = 0\nhits_per_page = 0", "toml")
            .unwrap()
            .sanitized();
        assert_eq!(cfg.history_capacity, 5);
        assert_eq!(cfg.hits_per_page, 8);
    }

    #[test]
    fn zero_pause_is_clamped_to_one_second() {
        let cfg = parse_config("pause_secs = 0", "toml").unwrap().sanitized();
        assert_eq!(cfg.pause_secs, 1);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_config("pause_secs = = 1", "toml").is_err());
    }
}
