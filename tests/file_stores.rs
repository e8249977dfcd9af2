// tests/file_stores.rs
use std::fs;
use std::path::Path;
use std::sync::Arc;

use announcement_watcher::store::{
    CsvRecordSink, HistoryStore, JsonHistoryRing, JsonWatermarkStore, RecordSink, WatermarkStore,
};
use announcement_watcher::{Item, NoveltyEngine};

fn it(title: &str, ts: i64) -> Item {
    Item::new(title, ts, format!("https://announcements.bybit.com/en-US/article/{title}"))
}

fn engine_at(dir: &Path) -> NoveltyEngine {
    let records = CsvRecordSink::new(dir.join("csv_data.csv"));
    let ring = JsonHistoryRing::new(dir.join("last_several_news.json"), 5);
    records.ensure_initialized().unwrap();
    ring.ensure_initialized().unwrap();
    NoveltyEngine::new(
        Arc::new(JsonWatermarkStore::new(dir.join("last_news.json"))),
        Arc::new(ring),
        Arc::new(records),
    )
}

#[test]
fn first_run_single_item() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let report = engine.evaluate_page(&[it("X", 500)]);
    assert_eq!(report.emitted_count(), 1);

    let wm = JsonWatermarkStore::new(dir.path().join("last_news.json"));
    assert_eq!(wm.load(), Some(it("X", 500)));

    let csv = fs::read_to_string(dir.path().join("csv_data.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "title,date_timestamp,url");
    assert_eq!(
        lines[1],
        "X,1970-01-01 00:08:20,https://announcements.bybit.com/en-US/article/X"
    );

    let ring: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("last_several_news.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        ring["last_news"][0],
        "https://announcements.bybit.com/en-US/article/X"
    );
}

#[test]
fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let page = vec![it("A", 1000), it("B", 1005), it("C", 1005)];

    assert_eq!(engine_at(dir.path()).evaluate_page(&page).emitted_count(), 3);

    // fresh instances over the same files, as after a process restart
    let again = engine_at(dir.path()).evaluate_page(&page);
    assert_eq!(again.emitted_count(), 0);

    let csv = fs::read_to_string(dir.path().join("csv_data.csv")).unwrap();
    assert_eq!(csv.lines().count(), 4);
}

#[test]
fn corrupt_watermark_is_repaired_on_next_emit() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("last_news.json"), "{oops").unwrap();
    let engine = engine_at(dir.path());

    let report = engine.evaluate_page(&[it("Q", 42)]);
    assert_eq!(report.emitted_count(), 1);
    let wm = JsonWatermarkStore::new(dir.path().join("last_news.json"));
    assert_eq!(wm.load(), Some(it("Q", 42)));
}

#[test]
fn ring_file_stays_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let ring = JsonHistoryRing::new(dir.path().join("ring.json"), 5);
    for i in 0..6 {
        ring.push(&format!("u{i}")).unwrap();
    }
    assert_eq!(ring.load(), vec!["u5", "u4", "u3", "u2", "u1"]);
}

#[test]
fn unwritable_record_dir_reports_failure_without_moving_watermark() {
    let dir = tempfile::tempdir().unwrap();
    // a directory where the CSV file should be makes every append fail
    let records_path = dir.path().join("csv_data.csv");
    fs::create_dir_all(&records_path).unwrap();

    let wm = Arc::new(JsonWatermarkStore::new(dir.path().join("last_news.json")));
    let engine = NoveltyEngine::new(
        wm.clone(),
        Arc::new(JsonHistoryRing::new(dir.path().join("ring.json"), 5)),
        Arc::new(CsvRecordSink::new(records_path)),
    );

    let report = engine.evaluate_page(&[it("A", 1), it("B", 2)]);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.deferred_count(), 1);
    assert!(wm.load().is_none());
}

#[test]
fn crash_recovery_with_multi_line_title_writes_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());
    let a = it("A", 1000);
    let b = Item::new("Launchpool:\r\nnew round", 1001, "https://x.test/b");
    assert_eq!(engine.evaluate_page(&[a.clone()]).emitted_count(), 1);

    // the row landed but the process died before the watermark save
    CsvRecordSink::new(dir.path().join("csv_data.csv"))
        .append(&b)
        .unwrap();

    let report = engine_at(dir.path()).evaluate_page(&[a, b.clone()]);
    assert_eq!(report.emitted_count(), 1);

    let csv = fs::read_to_string(dir.path().join("csv_data.csv")).unwrap();
    assert_eq!(csv.matches("Launchpool:").count(), 1);
    let wm = JsonWatermarkStore::new(dir.path().join("last_news.json"));
    assert_eq!(wm.load(), Some(b));
}
