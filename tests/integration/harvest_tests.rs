//! End-to-end harvest runs against the scripted renderer

use crate::support::{
    detail_url, fast_config, Catalog, InterruptingSink, ScriptedRenderer, WatchedSink,
};
use catalog_harvest::crawler::{Coordinator, ALREADY_PROCESSED};
use catalog_harvest::extract::SchoolDetailExtractor;
use catalog_harvest::storage::{CsvSink, RecordSink};
use catalog_harvest::{HarvestError, RecordStatus};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn coordinator(
    dir: &TempDir,
    renderer: Arc<ScriptedRenderer>,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
    tweak: impl FnOnce(&mut catalog_harvest::Config),
) -> Coordinator {
    let mut config = fast_config(dir.path());
    tweak(&mut config);
    Coordinator::new(
        config,
        renderer,
        sink,
        Arc::new(SchoolDetailExtractor::new().unwrap()),
        cancel,
    )
    .unwrap()
}

#[tokio::test]
async fn test_two_successes_and_one_exhausted_fetch() {
    let dir = TempDir::new().unwrap();
    let mut catalog = Catalog::new(vec![vec![11, 12, 13]]);
    catalog.failing.insert(13);
    let renderer = Arc::new(ScriptedRenderer::new(catalog));
    let sink = Arc::new(CsvSink::new(dir.path()));

    let mut coordinator = coordinator(
        &dir,
        renderer.clone(),
        sink.clone(),
        CancellationToken::new(),
        |_| {},
    );
    let stats = coordinator.run_full().await.unwrap();

    assert_eq!(stats.total_processed, 3);
    assert_eq!(stats.successful, 2);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.total_pages, 1);
    assert_eq!(stats.total_items, 3);
    assert!(stats.is_consistent());

    // Two successes take one load each, the failure uses the full retry budget
    assert_eq!(renderer.activity.detail_loads.load(Ordering::SeqCst), 5);

    assert_eq!(sink.count_persisted_records(), 3);
    assert!(sink.verify_integrity());

    let records = coordinator.state().records();
    let failed: Vec<_> = records
        .iter()
        .filter(|r| r.status == RecordStatus::Error)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].detail_url, detail_url(13));
    assert!(failed[0]
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("502"));

    let summary = coordinator.summary();
    assert_eq!(summary.classification_counts.get("PEI"), Some(&2));
    assert_eq!(summary.file_info.map(|f| f.path), sink.path());
}

#[tokio::test]
async fn test_unreachable_page_yields_no_records() {
    let dir = TempDir::new().unwrap();
    let mut catalog = Catalog::new((1..=5).map(|p| vec![p * 100 + 1]).collect());
    catalog.last_reachable = 3;
    let renderer = Arc::new(ScriptedRenderer::new(catalog));
    let sink = Arc::new(CsvSink::new(dir.path()));

    let mut coordinator = coordinator(
        &dir,
        renderer.clone(),
        sink.clone(),
        CancellationToken::new(),
        |_| {},
    );
    let stats = coordinator.run_sample(5, 5).await.unwrap();

    assert_eq!(stats.pages_processed, 1);
    assert_eq!(stats.total_processed, 0);
    assert_eq!(sink.count_persisted_records(), 0);
    assert_eq!(coordinator.summary().integrity_ok, Some(true));
    assert_eq!(renderer.activity.detail_loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_full_run_skips_pages_past_the_stuck_control() {
    let dir = TempDir::new().unwrap();
    let mut catalog = Catalog::new((1..=5).map(|p| vec![p * 100 + 1, p * 100 + 2]).collect());
    catalog.last_reachable = 3;
    let renderer = Arc::new(ScriptedRenderer::new(catalog));
    let sink = Arc::new(CsvSink::new(dir.path()));

    let mut coordinator = coordinator(
        &dir,
        renderer,
        sink.clone(),
        CancellationToken::new(),
        |c| c.scraper.batch_size = 2,
    );
    let stats = coordinator.run_full().await.unwrap();

    assert_eq!(stats.total_pages, 5);
    assert_eq!(stats.pages_processed, 5);
    assert_eq!(stats.successful, 6);

    let urls: HashSet<String> = coordinator
        .state()
        .records()
        .iter()
        .map(|r| r.detail_url.clone())
        .collect();
    assert!(urls.contains(&detail_url(302)));
    assert!(!urls.contains(&detail_url(401)));
    assert!(!urls.contains(&detail_url(501)));
}

#[tokio::test]
async fn test_batches_cover_every_page_once() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new((1..=7).map(|p| vec![p * 10 + 1, p * 10 + 2]).collect());
    let renderer = Arc::new(ScriptedRenderer::new(catalog));
    let sink = Arc::new(CsvSink::new(dir.path()));

    let mut coordinator = coordinator(
        &dir,
        renderer.clone(),
        sink.clone(),
        CancellationToken::new(),
        |c| {
            c.scraper.batch_size = 3;
            c.scraper.sessions_per_batch = 2;
        },
    );
    let stats = coordinator.run_full().await.unwrap();

    assert_eq!(stats.pages_processed, 7);
    assert_eq!(stats.successful, 14);
    assert_eq!(sink.count_persisted_records(), 14);

    let urls: HashSet<String> = coordinator
        .state()
        .records()
        .iter()
        .map(|r| r.detail_url.clone())
        .collect();
    assert_eq!(urls.len(), 14);

    // Batches of 3, 3 and 1 pages open 2, 2 and 1 lanes plus one for discovery
    let activity = &renderer.activity;
    assert_eq!(activity.contexts_opened.load(Ordering::SeqCst), 6);
    assert_eq!(
        activity.contexts_opened.load(Ordering::SeqCst),
        activity.contexts_closed.load(Ordering::SeqCst)
    );
    assert_eq!(
        activity.sessions_opened.load(Ordering::SeqCst),
        activity.sessions_closed.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_repeated_reference_is_skipped() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(vec![vec![1, 2], vec![2, 3]]);
    let renderer = Arc::new(ScriptedRenderer::new(catalog));
    let sink = Arc::new(CsvSink::new(dir.path()));

    let mut coordinator = coordinator(
        &dir,
        renderer.clone(),
        sink.clone(),
        CancellationToken::new(),
        |c| c.scraper.sessions_per_batch = 1,
    );
    let stats = coordinator.run_full().await.unwrap();

    assert_eq!(stats.total_processed, 4);
    assert_eq!(stats.successful, 3);
    assert_eq!(stats.skipped, 1);
    assert_eq!(renderer.activity.detail_loads.load(Ordering::SeqCst), 3);

    let skipped: Vec<_> = coordinator
        .state()
        .records()
        .iter()
        .filter(|r| r.status == RecordStatus::Skipped)
        .collect();
    assert_eq!(skipped[0].detail_url, detail_url(2));
    assert_eq!(skipped[0].error_message.as_deref(), Some(ALREADY_PROCESSED));
}

#[tokio::test]
async fn test_interrupt_keeps_exactly_the_appended_rows() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(vec![(1..=10).collect()]);
    let renderer = Arc::new(ScriptedRenderer::new(catalog));
    let cancel = CancellationToken::new();
    let sink = Arc::new(InterruptingSink::new(dir.path(), 4, cancel.clone()));

    let mut coordinator = coordinator(&dir, renderer, sink.clone(), cancel, |c| {
        c.scraper.max_concurrent = 1;
        c.scraper.sessions_per_batch = 1;
    });
    let err = coordinator.run_full().await.unwrap_err();

    assert!(matches!(err, HarvestError::Cancelled));
    assert_eq!(sink.count_persisted_records(), 4);
    assert!(sink.verify_integrity());
    assert_eq!(sink.final_sync_count(), 1);
    assert_eq!(coordinator.state().stats().total_processed, 4);
}

#[tokio::test]
async fn test_closing_twice_after_a_run() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(ScriptedRenderer::new(Catalog::new(vec![vec![7]])));
    let sink = Arc::new(CsvSink::new(dir.path()));

    let mut coordinator = coordinator(
        &dir,
        renderer,
        sink.clone(),
        CancellationToken::new(),
        |_| {},
    );
    coordinator.run_full().await.unwrap();

    assert!(sink.close().is_ok());
    assert!(sink.close().is_ok());
    assert_eq!(sink.final_sync_count(), 1);
    assert_eq!(sink.count_persisted_records(), 1);
}

#[tokio::test]
async fn test_interrupt_stops_retries_and_closes_sink_before_contexts() {
    let dir = TempDir::new().unwrap();
    let mut catalog = Catalog::new(vec![vec![1, 2], vec![3]]);
    catalog.failing.extend([1, 2, 3]);
    let renderer = Arc::new(ScriptedRenderer::new(catalog));
    let activity = renderer.activity.clone();
    let sink = Arc::new(WatchedSink::new(dir.path(), activity.clone()));
    let cancel = CancellationToken::new();

    let mut coordinator = coordinator(&dir, renderer, sink.clone(), cancel.clone(), |c| {
        c.scraper.sessions_per_batch = 2;
        c.scraper.retry_base_delay_ms = 1500;
        c.scraper.retry_max_delay_ms = 3000;
    });

    let loads_at_cancel = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let snapshot = loads_at_cancel.clone();
    let watched = activity.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        snapshot.store(watched.detail_loads.load(Ordering::SeqCst), Ordering::SeqCst);
        cancel.cancel();
    });

    let started = Instant::now();
    let err = coordinator.run_sample(1, 2).await.unwrap_err();

    assert!(matches!(err, HarvestError::Cancelled));
    assert!(started.elapsed() < Duration::from_millis(1400));

    // Each reference got its first attempt before the interrupt and no retry after
    assert_eq!(loads_at_cancel.load(Ordering::SeqCst), 3);
    assert_eq!(activity.detail_loads.load(Ordering::SeqCst), 3);

    assert_eq!(sink.contexts_closed_at_close(), Some(0));
    assert_eq!(activity.contexts_closed.load(Ordering::SeqCst), 2);
    assert!(sink.is_closed());

    let stats = coordinator.state().stats();
    assert_eq!(stats.errors, 3);
    assert_eq!(sink.count_persisted_records(), 3);
}

#[tokio::test]
async fn test_failed_append_keeps_persisted_rows_in_stats() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(ScriptedRenderer::new(Catalog::new(vec![vec![1, 2, 3, 4]])));
    let sink = Arc::new(WatchedSink::new(dir.path(), renderer.activity.clone()).failing_on(3));

    let mut coordinator = coordinator(
        &dir,
        renderer.clone(),
        sink.clone(),
        CancellationToken::new(),
        |c| c.scraper.max_concurrent = 1,
    );
    let err = coordinator.run_full().await.unwrap_err();

    assert!(matches!(err, HarvestError::Storage(_)));
    assert_eq!(sink.count_persisted_records(), 2);
    assert!(sink.is_closed());

    let stats = coordinator.state().stats();
    assert_eq!(stats.total_processed, 2);
    assert_eq!(stats.successful, 2);
    assert_eq!(coordinator.summary().stats.total_processed, 2);

    // The fourth reference is never admitted once the append failed
    assert_eq!(renderer.activity.detail_loads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_fetch_gate_holds_across_sessions() {
    let dir = TempDir::new().unwrap();
    let mut catalog = Catalog::new(
        (1..=4)
            .map(|p| (1..=4).map(|i| p * 10 + i).collect())
            .collect(),
    );
    catalog.detail_latency = Duration::from_millis(20);
    let renderer = Arc::new(ScriptedRenderer::new(catalog));
    let sink = Arc::new(CsvSink::new(dir.path()));

    let mut coordinator = coordinator(
        &dir,
        renderer.clone(),
        sink.clone(),
        CancellationToken::new(),
        |c| {
            c.scraper.batch_size = 4;
            c.scraper.sessions_per_batch = 4;
            c.scraper.max_concurrent = 2;
        },
    );
    let stats = coordinator.run_full().await.unwrap();

    assert_eq!(stats.successful, 16);
    let activity = &renderer.activity;
    assert_eq!(activity.peak_loads_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(activity.loads_in_flight.load(Ordering::SeqCst), 0);
}
