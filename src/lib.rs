// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod errors;
pub mod feed;
pub mod novelty;
pub mod poll;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::WatcherConfig;
pub use crate::errors::WatchError;
pub use crate::feed::{FeedSource, Item};
pub use crate::novelty::{classify, Classification, NoveltyEngine, PageReport, Verdict};
pub use crate::poll::{Phase, Poller, TickReport};
