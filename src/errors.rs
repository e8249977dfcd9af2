use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the feed transport and the three state stores.
///
/// None of these are fatal to the poll loop; each is reported where it happens
/// and the loop carries on with the next item or tick.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("feed transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed feed response: {0}")]
    MalformedResponse(String),
    #[error("failed to persist {store}: {source}")]
    Persistence {
        store: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("corrupt state in {}: {details}", .path.display())]
    StateCorruption { path: PathBuf, details: String },
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl WatchError {
    pub(crate) fn persistence(store: &'static str, source: io::Error) -> Self {
        Self::Persistence { store, source }
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}
