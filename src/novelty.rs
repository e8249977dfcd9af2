// src/novelty.rs
//! Novelty decision: compare each fetched item against the watermark and
//! persist confirmed items one at a time, oldest first.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::errors::WatchError;
use crate::feed::Item;
use crate::store::{HistoryStore, RecordSink, WatermarkStore};

/// Why an item was accepted as new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewReason {
    /// No watermark exists yet.
    FirstSeen,
    Newer,
    /// Same second as the watermark, different title.
    SameSecond,
}

/// Why an item was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same second and same title as the watermark.
    Duplicate,
    Older,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New(NewReason),
    Seen(SkipReason),
}

/// Pure comparison against the current floor.
///
/// New iff there is no watermark, or the item is not older than it and its
/// title differs. Equal seconds with a different title count as new because
/// the feed publishes several posts within the same second.
pub fn classify(item: &Item, watermark: Option<&Item>) -> Classification {
    let Some(wm) = watermark else {
        return Classification::New(NewReason::FirstSeen);
    };
    if item.published_at < wm.published_at {
        Classification::Seen(SkipReason::Older)
    } else if item.title == wm.title {
        // a newer timestamp with an identical title is a re-publish of the floor
        Classification::Seen(SkipReason::Duplicate)
    } else if item.published_at == wm.published_at {
        Classification::New(NewReason::SameSecond)
    } else {
        Classification::New(NewReason::Newer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Emitted(NewReason),
    Skipped(SkipReason),
    /// Classified new but persisting it failed; the watermark did not move.
    Failed { reason: NewReason, error: String },
    /// Not evaluated because an older item in the same page failed.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub item: Item,
    pub verdict: Verdict,
}

impl Evaluation {
    /// True when the item compared as new, whether or not it was persisted.
    pub fn is_new(&self) -> bool {
        matches!(self.verdict, Verdict::Emitted(_) | Verdict::Failed { .. })
    }

    pub fn is_emitted(&self) -> bool {
        matches!(self.verdict, Verdict::Emitted(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReport {
    pub evaluations: Vec<Evaluation>,
}

impl PageReport {
    pub fn emitted(&self) -> Vec<&Item> {
        self.evaluations
            .iter()
            .filter(|e| e.is_emitted())
            .map(|e| &e.item)
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Verdict) -> bool) -> usize {
        self.evaluations.iter().filter(|e| pred(&e.verdict)).count()
    }

    pub fn emitted_count(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Emitted(_)))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Skipped(_)))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Failed { .. }))
    }

    pub fn deferred_count(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Deferred))
    }
}

pub struct NoveltyEngine {
    watermark: Arc<dyn WatermarkStore>,
    history: Arc<dyn HistoryStore>,
    records: Arc<dyn RecordSink>,
}

impl NoveltyEngine {
    pub fn new(
        watermark: Arc<dyn WatermarkStore>,
        history: Arc<dyn HistoryStore>,
        records: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            watermark,
            history,
            records,
        }
    }

    pub fn records(&self) -> &Arc<dyn RecordSink> {
        &self.records
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Evaluate a page given oldest-first.
    ///
    /// Each confirmed item is appended, pushed to the ring and saved as the new
    /// watermark before the next item is looked at. The first persistence
    /// failure stops the page: later items are reported as deferred so the
    /// watermark never moves past an item that was not recorded.
    pub fn evaluate_page(&self, items: &[Item]) -> PageReport {
        let mut floor = self.watermark.load();
        let mut report = PageReport {
            evaluations: Vec::with_capacity(items.len()),
        };
        let mut halted = false;
        let mut first_new = true;

        for item in items {
            if halted {
                report.evaluations.push(Evaluation {
                    item: item.clone(),
                    verdict: Verdict::Deferred,
                });
                continue;
            }

            let verdict = match classify(item, floor.as_ref()) {
                Classification::Seen(reason) => {
                    debug!(target: "watcher", title = %item.title, ?reason, "not new");
                    counter!("watcher_items_skipped_total").increment(1);
                    Verdict::Skipped(reason)
                }
                Classification::New(reason) => match self.persist(item, first_new) {
                    Ok(()) => {
                        info!(
                            target: "watcher",
                            title = %item.title,
                            published_at = item.published_at,
                            url = %item.url,
                            ?reason,
                            "new announcement"
                        );
                        counter!("watcher_items_emitted_total").increment(1);
                        floor = Some(item.clone());
                        Verdict::Emitted(reason)
                    }
                    Err(e) => {
                        warn!(target: "watcher", title = %item.title, error = %e, "persist failed");
                        counter!("watcher_persist_errors_total").increment(1);
                        halted = true;
                        Verdict::Failed {
                            reason,
                            error: e.to_string(),
                        }
                    }
                },
            };
            if matches!(verdict, Verdict::Emitted(_) | Verdict::Failed { .. }) {
                first_new = false;
            }
            report.evaluations.push(Evaluation {
                item: item.clone(),
                verdict,
            });
        }
        report
    }

    /// Record, ring, watermark, in that order. For the first new item of a
    /// page a row that already sits at the end of the log means an earlier run
    /// stopped before saving the watermark; only the missing steps are redone.
    fn persist(&self, item: &Item, check_tail: bool) -> Result<(), WatchError> {
        if check_tail && self.records.is_last(item) {
            info!(target: "watcher", title = %item.title, "row already recorded, finishing watermark");
            if self.history.load().first().map(String::as_str) != Some(item.id()) {
                self.push_history(item);
            }
        } else {
            self.records.append(item)?;
            self.push_history(item);
        }
        self.watermark.save(item)
    }

    fn push_history(&self, item: &Item) {
        if let Err(e) = self.history.push(item.id()) {
            warn!(target: "watcher", error = %e, "history ring push failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn it(title: &str, ts: i64) -> Item {
        Item::new(title, ts, format!("https://x.test/{title}"))
    }

    #[test]
    fn no_watermark_is_first_seen() {
        assert_eq!(
            classify(&it("X", 500), None),
            Classification::New(NewReason::FirstSeen)
        );
    }

    #[test]
    fn equal_second_rules() {
        let wm = it("A", 1000);
        assert_eq!(
            classify(&it("B", 1000), Some(&wm)),
            Classification::New(NewReason::SameSecond)
        );
        assert_eq!(
            classify(&it("A", 1000), Some(&wm)),
            Classification::Seen(SkipReason::Duplicate)
        );
    }

    #[test]
    fn older_is_never_new() {
        let wm = it("A", 1000);
        assert_eq!(
            classify(&it("Z", 999), Some(&wm)),
            Classification::Seen(SkipReason::Older)
        );
        assert_eq!(
            classify(&it("A", 1), Some(&wm)),
            Classification::Seen(SkipReason::Older)
        );
    }

    #[test]
    fn newer_with_same_title_is_duplicate() {
        let wm = it("A", 1000);
        assert_eq!(
            classify(&it("A", 2000), Some(&wm)),
            Classification::Seen(SkipReason::Duplicate)
        );
        assert_eq!(
            classify(&it("B", 2000), Some(&wm)),
            Classification::New(NewReason::Newer)
        );
    }
}
