// src/poll.rs
//! Poll loop: INIT -> (BACKFILL) -> STEADY, a single worker fetching one page
//! at a time and handing it oldest-first to the novelty engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tracing::{error, info, warn};

use crate::config::WatcherConfig;
use crate::errors::WatchError;
use crate::feed::bybit::BybitFeed;
use crate::feed::FeedSource;
use crate::novelty::NoveltyEngine;
use crate::store::{CsvRecordSink, JsonHistoryRing, JsonWatermarkStore};

/// Page 0 is the live page.
pub const LIVE_PAGE: u32 = 0;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("watcher_fetch_total", "Feed pages requested.");
        describe_counter!(
            "watcher_fetch_errors_total",
            "Feed requests that failed or returned a malformed body."
        );
        describe_counter!(
            "watcher_items_emitted_total",
            "Items recorded as new announcements."
        );
        describe_counter!(
            "watcher_items_skipped_total",
            "Items compared as already seen."
        );
        describe_counter!(
            "watcher_persist_errors_total",
            "Items whose record or watermark write failed."
        );
        describe_gauge!("watcher_last_tick_ts", "Unix ts of the last finished poll.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Backfill,
    Steady,
}

/// Outcome of fetching and evaluating one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub page: u32,
    pub fetched: usize,
    pub emitted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deferred: usize,
    pub error: Option<String>,
}

pub struct Poller {
    feed: Arc<dyn FeedSource>,
    engine: NoveltyEngine,
    pause: Duration,
    phase: Phase,
}

impl Poller {
    pub fn new(feed: Arc<dyn FeedSource>, engine: NoveltyEngine, pause: Duration) -> Self {
        ensure_metrics_described();
        Self {
            feed,
            engine,
            pause,
            phase: Phase::Init,
        }
    }

    /// File-backed stores and the HTTP feed, wired from config.
    pub fn from_config(cfg: &WatcherConfig) -> Result<Self, WatchError> {
        let engine = NoveltyEngine::new(
            Arc::new(JsonWatermarkStore::new(cfg.watermark_path.clone())),
            Arc::new(JsonHistoryRing::new(cfg.history_path.clone(), cfg.history_capacity)),
            Arc::new(CsvRecordSink::new(cfg.records_path.clone())),
        );
        let feed = BybitFeed::from_config(cfg)?;
        Ok(Self::new(
            Arc::new(feed),
            engine,
            Duration::from_secs(cfg.pause_secs),
        ))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// INIT: make sure the record log and ring exist. Idempotent; failures are
    /// logged and the loop still starts.
    pub fn initialize(&mut self) {
        if let Err(e) = self.engine.records().ensure_initialized() {
            error!(target: "watcher", error = %e, "record sink init failed");
        }
        if let Err(e) = self.engine.history().ensure_initialized() {
            warn!(target: "watcher", error = %e, "history ring init failed");
        }
    }

    /// Fetch one page and evaluate it oldest-first. Never sleeps.
    pub async fn poll_page(&self, page: u32) -> TickReport {
        info!(target: "watcher", page, feed = self.feed.name(), "sending request");
        counter!("watcher_fetch_total").increment(1);

        let mut report = TickReport {
            page,
            ..Default::default()
        };
        let mut items = match self.feed.fetch_page(page).await {
            Ok(v) => v,
            Err(e @ WatchError::MalformedResponse(_)) => {
                warn!(target: "watcher", page, error = %e, "malformed page, treating as empty");
                counter!("watcher_fetch_errors_total").increment(1);
                report.error = Some(e.to_string());
                Vec::new()
            }
            Err(e) => {
                warn!(target: "watcher", page, error = %e, "fetch failed, skipping tick");
                report.error = Some(e.to_string());
                return report;
            }
        };

        // the feed serves newest-first
        items.reverse();
        let page_report = self.engine.evaluate_page(&items);

        report.fetched = items.len();
        report.emitted = page_report.emitted_count();
        report.skipped = page_report.skipped_count();
        report.failed = page_report.failed_count();
        report.deferred = page_report.deferred_count();
        gauge!("watcher_last_tick_ts").set(chrono::Utc::now().timestamp() as f64);
        report
    }

    /// BACKFILL: walk pages `from_page - 1` down to 1, pausing after each.
    ///
    /// A page that left items failed or deferred is polled again before moving
    /// on; otherwise the next page's newer items would push the watermark past
    /// them for good.
    pub async fn backfill(&mut self, from_page: u32) -> Vec<TickReport> {
        let mut reports = Vec::new();
        self.walk_backfill(from_page, |r| reports.push(r)).await;
        reports
    }

    async fn walk_backfill(&mut self, from_page: u32, mut on_page: impl FnMut(TickReport)) {
        if from_page <= 1 {
            return;
        }
        self.phase = Phase::Backfill;
        info!(target: "watcher", pages = from_page - 1, "backfilling history");
        let mut page = from_page - 1;
        while page >= 1 {
            let report = self.poll_page(page).await;
            let unfinished = report.failed + report.deferred > 0;
            if unfinished {
                warn!(
                    target: "watcher",
                    page,
                    failed = report.failed,
                    deferred = report.deferred,
                    "page not fully recorded, polling it again"
                );
            }
            on_page(report);
            tokio::time::sleep(self.pause).await;
            if !unfinished {
                page -= 1;
            }
        }
    }

    /// One STEADY iteration: live page, then the pause.
    pub async fn tick(&mut self) -> TickReport {
        self.phase = Phase::Steady;
        let report = self.poll_page(LIVE_PAGE).await;
        if report.emitted > 0 || report.failed > 0 {
            info!(
                target: "watcher",
                emitted = report.emitted,
                failed = report.failed,
                deferred = report.deferred,
                "tick done"
            );
        }
        tokio::time::sleep(self.pause).await;
        report
    }

    /// Runs forever; stop it by dropping the future.
    pub async fn run(mut self, from_page: u32) {
        self.initialize();
        // the depth comes from the CLI, so reports are not kept here
        self.walk_backfill(from_page, |_| {}).await;
        loop {
            self.tick().await;
        }
    }

    /// Run until `shutdown` resolves. All persistence happens synchronously
    /// between await points, so stopping here never leaves a half-written item.
    pub async fn run_until<S>(self, from_page: u32, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.run(from_page) => {}
            _ = shutdown => {
                info!(target: "watcher", "shutdown requested, stopping poll loop");
            }
        }
    }
}
