// src/feed/headers.rs
//! Request headers for the announcement API. Each request carries a fresh
//! user agent and a random subset of filler headers so CDN caches keyed on
//! the header set never serve a stale page.

use chrono::{DateTime, Duration, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ORIGIN, USER_AGENT};

use crate::errors::WatchError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.51",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.82 Mobile Safari/537.36",
];

const EXCHANGES: &[&str] = &["ByBIT"];
const REQUIRED_DATA: &[&str] = &["json", "xml", "xlsx", "txt"];
const CURRENCIES: &[&str] = &["BTC", "ETH", "XRP", "DASH", "SOL", "BNB", "ADA", "LTC"];

/// Produces the header set for one outgoing feed request.
pub trait RequestDecorator: Send + Sync {
    fn headers(&self) -> HeaderMap;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filler {
    Time,
    Exchange,
    Expire,
    RequiredData,
    Currency,
}

const FILLERS: [Filler; 5] = [
    Filler::Time,
    Filler::Exchange,
    Filler::Expire,
    Filler::RequiredData,
    Filler::Currency,
];

impl Filler {
    fn name(self) -> HeaderName {
        match self {
            Filler::Time => HeaderName::from_static("time"),
            Filler::Exchange => HeaderName::from_static("exchange"),
            Filler::Expire => HeaderName::from_static("expire"),
            Filler::RequiredData => HeaderName::from_static("required-data"),
            Filler::Currency => HeaderName::from_static("currency"),
        }
    }

    fn value<R: Rng + ?Sized>(self, rng: &mut R, now: DateTime<Utc>) -> String {
        match self {
            Filler::Time => fmt_utc(now),
            Filler::Exchange => pick(rng, EXCHANGES),
            Filler::Expire => {
                let d: i64 = rng.random_range(0..=27);
                let at = now + Duration::days(d) + Duration::minutes(d + 3) + Duration::seconds(d + 1);
                fmt_utc(at)
            }
            Filler::RequiredData => pick(rng, REQUIRED_DATA),
            Filler::Currency => pick(rng, CURRENCIES),
        }
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, options: &[&str]) -> String {
    options.choose(rng).copied().unwrap_or_default().to_string()
}

fn fmt_utc(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Fixed `Origin`/`Accept` pair plus a random user agent and 0..=5 filler headers.
#[derive(Debug, Clone)]
pub struct RandomizedHeaders {
    origin: HeaderValue,
    accept: HeaderValue,
}

impl RandomizedHeaders {
    pub fn new(origin: &str, accept: &str) -> Result<Self, WatchError> {
        let origin = HeaderValue::from_str(origin)
            .map_err(|e| WatchError::Configuration(format!("invalid origin header: {e}")))?;
        let accept = HeaderValue::from_str(accept)
            .map_err(|e| WatchError::Configuration(format!("invalid accept header: {e}")))?;
        Ok(Self { origin, accept })
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R, now: DateTime<Utc>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, self.origin.clone());
        headers.insert(ACCEPT, self.accept.clone());
        if let Ok(ua) = HeaderValue::from_str(&pick(rng, USER_AGENTS)) {
            headers.insert(USER_AGENT, ua);
        }

        let count = rng.random_range(0..=FILLERS.len());
        for filler in FILLERS.choose_multiple(rng, count) {
            if let Ok(v) = HeaderValue::from_str(&filler.value(rng, now)) {
                headers.insert(filler.name(), v);
            }
        }
        headers
    }
}

impl RequestDecorator for RandomizedHeaders {
    fn headers(&self) -> HeaderMap {
        self.generate(&mut rand::rng(), Utc::now())
    }
}
