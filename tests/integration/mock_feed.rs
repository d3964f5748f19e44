//! In-memory feed and alert sink for integration testing.
//!
//! `MockFeed` replays scripted responses per symbol and records every
//! fetch; `RecordingSink` keeps every message it is handed. Both hand out
//! shared handles so tests can inspect them after the scanner takes
//! ownership.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use breakout_scanner::alerts::{AlertDispatcher, AlertSink, DeliveryError};
use breakout_scanner::config::{self, RawConfig};
use breakout_scanner::engine::{Scanner, ScannerOptions};
use breakout_scanner::feed::{CandleFeed, FetchError};
use breakout_scanner::types::{Candle, EffectiveConfig};

type Response = Result<Vec<Candle>, FetchError>;

#[derive(Clone)]
enum Script {
    /// Pop responses in order; the last one repeats.
    Replay(VecDeque<Response>),
    /// Never resolve.
    Hang,
}

/// A deterministic `CandleFeed`. Unscripted symbols return no data.
#[derive(Clone, Default)]
pub struct MockFeed {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `symbol` with `response`.
    pub fn respond(self, symbol: &str, response: Response) -> Self {
        self.script(symbol, vec![response])
    }

    /// Answer `symbol` with each response in turn, repeating the last.
    pub fn script(self, symbol: &str, responses: Vec<Response>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Script::Replay(responses.into()));
        self
    }

    /// Make every fetch of `symbol` block forever.
    pub fn hang(self, symbol: &str) -> Self {
        self.scripts.lock().unwrap().insert(symbol.to_string(), Script::Hang);
        self
    }

    /// Symbols fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_response(&self, symbol: &str) -> Option<Response> {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(symbol) {
            None => Some(Ok(Vec::new())),
            Some(Script::Hang) => None,
            Some(Script::Replay(queue)) => {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            }
        }
    }
}

#[async_trait]
impl CandleFeed for MockFeed {
    async fn fetch_candles(
        &self,
        symbol: &str,
        _interval_secs: u64,
        _lookback: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        self.calls.lock().unwrap().push(symbol.to_string());
        match self.next_response(symbol) {
            Some(response) => response,
            None => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Alert sink that records every message it receives.
#[derive(Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<String>>>,
    reject: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records but then rejects every message.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.messages().iter().filter(|m| m.starts_with(prefix)).count()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn post_message(&self, text: &str) -> Result<(), DeliveryError> {
        self.messages.lock().unwrap().push(text.to_string());
        if self.reject {
            return Err(DeliveryError::Rejected {
                status: 400,
                body: "rejected by test sink".into(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// Candle fixtures
// ---------------------------------------------------------------------------

/// Three flat candles whose last one clears the prior high by 3% on
/// double volume ($2,060 notional).
pub fn breakout_candles() -> Vec<Candle> {
    vec![
        Candle::flat(1_700_000_000, 100.0, 10.0),
        Candle::flat(1_700_000_060, 100.0, 10.0),
        Candle::flat(1_700_000_120, 103.0, 20.0),
    ]
}

pub fn quiet_candles() -> Vec<Candle> {
    vec![
        Candle::flat(1_700_000_000, 100.0, 10.0),
        Candle::flat(1_700_000_060, 100.0, 10.0),
        Candle::flat(1_700_000_120, 100.0, 10.0),
    ]
}

// ---------------------------------------------------------------------------
// Config fixtures
// ---------------------------------------------------------------------------

/// Resolve a TOML document and point its snapshot at a fresh temp file.
pub fn effective_config(doc: &str, market: Option<&str>) -> EffectiveConfig {
    let raw = RawConfig::from_toml_str(doc, "test").unwrap();
    let mut cfg = config::resolve(&raw, market).unwrap();
    cfg.scanner.snapshot_path = std::env::temp_dir()
        .join(format!("breakout_scanner_it_{}.json", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    cfg
}

pub fn build_scanner(
    cfg: EffectiveConfig,
    feed: &MockFeed,
    sink: &RecordingSink,
    max_cycles: Option<u64>,
) -> Scanner {
    Scanner::new(
        cfg,
        Box::new(feed.clone()),
        AlertDispatcher::new(Box::new(sink.clone())),
        ScannerOptions {
            verbose: false,
            max_cycles,
        },
    )
}
