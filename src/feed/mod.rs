// src/feed/mod.rs
pub mod bybit;
pub mod headers;
pub mod types;

pub use types::{FeedSource, Item};
