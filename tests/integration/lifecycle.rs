//! Whole-run behaviour: ordering across cycles, notices, pruning,
//! cancellation and the shutdown snapshot.

use std::time::{Duration, Instant};

use breakout_scanner::engine::{shutdown, ScannerState};
use breakout_scanner::storage;

use crate::mock_feed::{build_scanner, effective_config, quiet_candles, MockFeed, RecordingSink};

const DOC: &str = r#"
base_coins = ["BTC-USD", "ETH-USD"]

[scanner]
sleep_seconds_between_cycles = 0

[markets.coinbase]
coins = ["SOL-USD"]
"#;

fn all_quiet() -> MockFeed {
    MockFeed::new()
        .respond("BTC-USD", Ok(quiet_candles()))
        .respond("ETH-USD", Ok(quiet_candles()))
        .respond("SOL-USD", Ok(quiet_candles()))
}

#[tokio::test]
async fn test_symbols_visited_in_same_order_every_cycle() {
    let feed = all_quiet();
    let sink = RecordingSink::new();
    let cfg = effective_config(DOC, None);
    let path = cfg.scanner.snapshot_path.clone();
    let mut scanner = build_scanner(cfg, &feed, &sink, Some(3));

    let (_trigger, shutdown) = shutdown::channel();
    let summary = scanner.run(shutdown).await.unwrap();

    assert_eq!(summary.cycles, 3);
    let order = ["BTC-USD", "ETH-USD", "SOL-USD"];
    let expected: Vec<&str> = order.iter().cycle().take(9).copied().collect();
    assert_eq!(feed.calls(), expected);

    storage::delete_snapshot(&path).unwrap();
}

#[tokio::test]
async fn test_startup_and_maintenance_notices() {
    let feed = all_quiet();
    let sink = RecordingSink::new();
    let cfg = effective_config(DOC, None);
    let path = cfg.scanner.snapshot_path.clone();
    let mut scanner = build_scanner(cfg, &feed, &sink, Some(1));
    let run_id = scanner.run_id().to_string();

    let (_trigger, shutdown) = shutdown::channel();
    scanner.run(shutdown).await.unwrap();

    let messages = sink.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].starts_with("🟢 Scanner online"));
    assert!(messages[0].contains(&run_id));
    assert!(messages[1].contains("temporarily down for maintenance"));
    assert!(messages[1].contains("3 symbols saved"));
    assert_eq!(scanner.state(), ScannerState::Terminated);

    let saved = storage::load_snapshot(&path).unwrap();
    assert_eq!(saved, Some(vec!["BTC-USD".to_string(), "ETH-USD".into(), "SOL-USD".into()]));
    storage::delete_snapshot(&path).unwrap();
}

#[tokio::test]
async fn test_cancel_during_sleep_writes_snapshot_promptly() {
    let mut cfg = effective_config(DOC, None);
    cfg.scanner.sleep_seconds_between_cycles = 3600;
    let path = cfg.scanner.snapshot_path.clone();
    let feed = all_quiet();
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(cfg, &feed, &sink, None);

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
    });

    let started = Instant::now();
    let summary = tokio::time::timeout(Duration::from_secs(2), scanner.run(shutdown))
        .await
        .expect("shutdown should cut the sleep short")
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(summary.cycles, 1);
    assert!(storage::load_snapshot(&path).unwrap().is_some());
    assert!(sink.messages().last().unwrap().contains("temporarily down for maintenance"));
    storage::delete_snapshot(&path).unwrap();
}

#[tokio::test]
async fn test_cancel_during_hung_fetch() {
    let cfg = effective_config(DOC, None);
    let path = cfg.scanner.snapshot_path.clone();
    let feed = all_quiet().hang("ETH-USD");
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(cfg, &feed, &sink, None);

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
    });

    let summary = tokio::time::timeout(Duration::from_secs(2), scanner.run(shutdown))
        .await
        .expect("in-flight fetch should be dropped")
        .unwrap();

    assert_eq!(feed.calls(), vec!["BTC-USD", "ETH-USD"]);
    assert_eq!(summary.symbols.len(), 3);
    assert!(storage::load_snapshot(&path).unwrap().is_some());
    storage::delete_snapshot(&path).unwrap();
}

#[tokio::test]
async fn test_cancel_during_request_spacing() {
    let mut cfg = effective_config(DOC, None);
    cfg.scanner.request_spacing_ms = 60_000;
    let path = cfg.scanner.snapshot_path.clone();
    let feed = all_quiet();
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(cfg, &feed, &sink, None);

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
    });

    tokio::time::timeout(Duration::from_secs(2), scanner.run(shutdown))
        .await
        .expect("spacing should be cancellable")
        .unwrap();

    assert_eq!(feed.calls(), vec!["BTC-USD"]);
    storage::delete_snapshot(&path).unwrap();
}

#[tokio::test]
async fn test_pruned_symbols_left_out_of_snapshot() {
    let mut cfg = effective_config(DOC, None);
    cfg.scanner.prune_after_no_data_cycles = 2;
    let path = cfg.scanner.snapshot_path.clone();
    // SOL-USD never returns data
    let feed = MockFeed::new()
        .respond("BTC-USD", Ok(quiet_candles()))
        .respond("ETH-USD", Ok(quiet_candles()));
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(cfg, &feed, &sink, Some(3));

    let (_trigger, shutdown) = shutdown::channel();
    let summary = scanner.run(shutdown).await.unwrap();

    assert_eq!(summary.symbols, vec!["BTC-USD", "ETH-USD"]);
    // third cycle no longer visits the pruned symbol
    assert_eq!(feed.calls().iter().filter(|s| *s == "SOL-USD").count(), 2);
    assert_eq!(
        storage::load_snapshot(&path).unwrap(),
        Some(vec!["BTC-USD".to_string(), "ETH-USD".into()])
    );
    assert!(sink.messages().last().unwrap().contains("2 symbols saved"));
    storage::delete_snapshot(&path).unwrap();
}
