//! Single-cycle behaviour: classification, containment, alert content.

use breakout_scanner::engine::shutdown;
use breakout_scanner::feed::FetchError;

use crate::mock_feed::{breakout_candles, build_scanner, effective_config, quiet_candles, MockFeed, RecordingSink};

const DOC: &str = r#"
base_coins = ["btc-usd", "ETH-USD"]

[scanner]
sleep_seconds_between_cycles = 0

[markets.coinbase]
coins = ["SOL-USD", "eth-usd"]
"#;

#[tokio::test]
async fn test_single_transport_failure_is_contained() {
    let feed = MockFeed::new()
        .respond("BTC-USD", Ok(quiet_candles()))
        .respond("ETH-USD", Err(FetchError::Transport("connection reset".into())))
        .respond("SOL-USD", Ok(quiet_candles()));
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(effective_config(DOC, None), &feed, &sink, None);

    let (_trigger, mut shutdown) = shutdown::channel();
    let stats = scanner.run_cycle(&mut shutdown).await;

    assert_eq!(feed.calls(), vec!["BTC-USD", "ETH-USD", "SOL-USD"]);
    assert_eq!(stats.processed(), 3);
    assert_eq!(stats.success, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.failed_symbols, vec!["ETH-USD"]);
    assert!(!stats.interrupted);

    assert_eq!(sink.messages(), vec!["⚠️ Fetch failed: ETH-USD — transport error: connection reset"]);
}

#[tokio::test]
async fn test_no_data_is_counted_separately() {
    let feed = MockFeed::new().respond("BTC-USD", Ok(quiet_candles()));
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(effective_config(DOC, None), &feed, &sink, None);

    let (_trigger, mut shutdown) = shutdown::channel();
    let stats = scanner.run_cycle(&mut shutdown).await;

    assert_eq!(stats.success, 1);
    assert_eq!(stats.no_data, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.no_data_symbols, vec!["ETH-USD", "SOL-USD"]);
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn test_every_error_kind_is_a_failure() {
    let feed = MockFeed::new()
        .respond(
            "BTC-USD",
            Err(FetchError::Status {
                status: 503,
                body: "unavailable".into(),
            }),
        )
        .respond("ETH-USD", Err(FetchError::Malformed("expected array".into())))
        .respond("SOL-USD", Ok(breakout_candles()));
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(effective_config(DOC, None), &feed, &sink, None);

    let (_trigger, mut shutdown) = shutdown::channel();
    let stats = scanner.run_cycle(&mut shutdown).await;

    assert_eq!(stats.failed, 2);
    assert_eq!(stats.failed_symbols, vec!["BTC-USD", "ETH-USD"]);
    assert_eq!(stats.breakouts, 1);
    assert_eq!(sink.count_starting_with("⚠️ Fetch failed"), 2);
    assert_eq!(sink.count_starting_with("🚀 Breakout: SOL-USD"), 1);
}

#[tokio::test]
async fn test_breakout_alert_lists_every_fired_band() {
    let feed = MockFeed::new().respond("BTC-USD", Ok(breakout_candles()));
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(effective_config(DOC, None), &feed, &sink, None);

    let (_trigger, mut shutdown) = shutdown::channel();
    let stats = scanner.run_cycle(&mut shutdown).await;
    assert_eq!(stats.alerts_sent, 1);

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    let alert = &messages[0];
    assert!(alert.starts_with("🚀 Breakout: BTC-USD (60s)"));
    assert!(alert.contains("Window Δ: +3.00%"));
    assert!(alert.contains("Range: 2.91%"));
    assert!(alert.contains("• fast (3 bars): +3.00% over high"));
    assert!(alert.contains("• medium (3 bars)"));
    assert!(alert.contains("• slow (3 bars)"));
    assert!(alert.contains("USD/min $2,060"));
}

#[tokio::test]
async fn test_simple_mode_reports_fast_band_only() {
    let doc = format!("{DOC}\n[markets.coinbase.scanner]\nsimple_mode = true\n");
    let feed = MockFeed::new().respond("BTC-USD", Ok(breakout_candles()));
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(effective_config(&doc, None), &feed, &sink, None);

    let (_trigger, mut shutdown) = shutdown::channel();
    scanner.run_cycle(&mut shutdown).await;

    let alert = sink.messages().remove(0);
    assert!(alert.contains("• fast"));
    assert!(!alert.contains("• medium"));
    assert!(!alert.contains("• slow"));
}

#[tokio::test]
async fn test_market_dollar_floor_override_blocks_alert() {
    let doc = format!("{DOC}\n[markets.coinbase.scanner]\nabs_volume_min_usd = 5000.0\n");
    let feed = MockFeed::new().respond("BTC-USD", Ok(breakout_candles()));
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(effective_config(&doc, None), &feed, &sink, None);

    let (_trigger, mut shutdown) = shutdown::channel();
    let stats = scanner.run_cycle(&mut shutdown).await;

    assert_eq!(stats.breakouts, 0);
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn test_failed_symbol_recovers_next_cycle() {
    let feed = MockFeed::new().script(
        "ETH-USD",
        vec![Err(FetchError::Transport("timeout".into())), Ok(quiet_candles())],
    );
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(effective_config(DOC, None), &feed, &sink, None);

    let (_trigger, mut shutdown) = shutdown::channel();
    let first = scanner.run_cycle(&mut shutdown).await;
    let second = scanner.run_cycle(&mut shutdown).await;

    assert_eq!(first.failed, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(second.success, 1);
    assert_eq!(second.cycle, 2);
}

#[tokio::test]
async fn test_rejecting_sink_does_not_stop_scan() {
    let feed = MockFeed::new()
        .respond("BTC-USD", Ok(breakout_candles()))
        .respond("ETH-USD", Err(FetchError::Transport("reset".into())))
        .respond("SOL-USD", Ok(quiet_candles()));
    let sink = RecordingSink::rejecting();
    let mut scanner = build_scanner(effective_config(DOC, None), &feed, &sink, None);

    let (_trigger, mut shutdown) = shutdown::channel();
    let stats = scanner.run_cycle(&mut shutdown).await;

    assert_eq!(stats.processed(), 3);
    assert_eq!(sink.messages().len(), 2);
    assert_eq!(scanner.alerts().failed(), 2);
    assert_eq!(scanner.alerts().delivered(), 0);
}

#[tokio::test]
async fn test_cooldown_holds_back_repeat_breakouts() {
    let mut cfg = effective_config(DOC, None);
    cfg.scanner.alert_cooldown_seconds = 600;
    let feed = MockFeed::new().respond("BTC-USD", Ok(breakout_candles()));
    let sink = RecordingSink::new();
    let mut scanner = build_scanner(cfg, &feed, &sink, None);

    let (_trigger, mut shutdown) = shutdown::channel();
    let first = scanner.run_cycle(&mut shutdown).await;
    let second = scanner.run_cycle(&mut shutdown).await;

    assert_eq!(first.alerts_sent, 1);
    assert_eq!(second.breakouts, 1);
    assert_eq!(second.alerts_sent, 0);
    assert_eq!(second.alerts_suppressed, 1);
    assert_eq!(sink.count_starting_with("🚀"), 1);
}
