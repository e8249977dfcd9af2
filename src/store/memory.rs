// src/store/memory.rs
//! In-memory stores for tests and dry runs.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::errors::WatchError;
use crate::feed::Item;
use crate::store::history::push_front_bounded;
use crate::store::{HistoryStore, RecordSink, WatermarkStore};

fn injected(store: &'static str) -> WatchError {
    WatchError::persistence(store, io::Error::other("injected failure"))
}

/// Counts down queued failures; `0` means healthy.
#[derive(Debug, Default)]
struct FailPlan(AtomicUsize);

impl FailPlan {
    fn arm(&self, n: usize) {
        self.0.store(n, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Default)]
pub struct MemoryWatermark {
    current: Mutex<Option<Item>>,
    fail: FailPlan,
    pub saves: AtomicUsize,
}

impl MemoryWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(item: Item) -> Self {
        let s = Self::default();
        *s.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(item);
        s
    }

    /// Make the next `n` saves fail.
    pub fn fail_next_saves(&self, n: usize) {
        self.fail.arm(n);
    }
}

impl WatermarkStore for MemoryWatermark {
    fn load(&self) -> Option<Item> {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn save(&self, item: &Item) -> Result<(), WatchError> {
        if self.fail.take() {
            return Err(injected("watermark"));
        }
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(item.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryHistory {
    cap: usize,
    entries: Mutex<Vec<String>>,
    fail: FailPlan,
}

impl MemoryHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            entries: Mutex::new(Vec::new()),
            fail: FailPlan::default(),
        }
    }

    pub fn fail_next_pushes(&self, n: usize) {
        self.fail.arm(n);
    }
}

impl HistoryStore for MemoryHistory {
    fn ensure_initialized(&self) -> Result<(), WatchError> {
        Ok(())
    }

    fn load(&self) -> Vec<String> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn push(&self, id: &str) -> Result<(), WatchError> {
        if self.fail.take() {
            return Err(injected("history ring"));
        }
        let mut g = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let cur = std::mem::take(&mut *g);
        *g = push_front_bounded(cur, id, self.cap);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecords {
    rows: Mutex<Vec<Item>>,
    fail: FailPlan,
    pub initialized: AtomicUsize,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a row landed without going through `append`.
    pub fn preload(&self, item: Item) {
        self.rows.lock().unwrap_or_else(|p| p.into_inner()).push(item);
    }

    pub fn rows(&self) -> Vec<Item> {
        self.rows.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.rows().into_iter().map(|i| i.title).collect()
    }

    /// Make the next `n` appends fail.
    pub fn fail_next_appends(&self, n: usize) {
        self.fail.arm(n);
    }
}

impl RecordSink for MemoryRecords {
    fn ensure_initialized(&self) -> Result<(), WatchError> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn append(&self, item: &Item) -> Result<(), WatchError> {
        if self.fail.take() {
            return Err(injected("record sink"));
        }
        self.rows
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(item.clone());
        Ok(())
    }

    fn is_last(&self, item: &Item) -> bool {
        self.rows
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .last()
            .is_some_and(|last| last == item)
    }
}
