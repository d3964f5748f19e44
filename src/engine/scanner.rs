//! Scan loop.
//!
//! Owns the working symbol set and drives the per-cycle pipeline:
//! fetch → classify → evaluate bands → alert, then report, sleep and
//! repeat until shutdown. Every await point that can block is raced
//! against the shutdown signal; on exit the symbol set is persisted and
//! a maintenance notice goes out.

use anyhow::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::alerts::format;
use crate::alerts::AlertDispatcher;
use crate::engine::shutdown::Shutdown;
use crate::engine::stats::{AlertAction, CycleStats, SymbolOutcome};
use crate::feed::CandleFeed;
use crate::storage;
use crate::strategy::{self, breakout};
use crate::types::EffectiveConfig;

/// Per-symbol lines go to info when verbose, debug otherwise.
macro_rules! symbol_log {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    Running,
    Scanning,
    Reporting,
    Sleeping,
    ShuttingDown,
    Terminated,
}

#[derive(Debug, Clone, Default)]
pub struct ScannerOptions {
    /// Log every symbol at info level.
    pub verbose: bool,
    /// Stop after this many completed cycles.
    pub max_cycles: Option<u64>,
}

/// What a finished run leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub cycles: u64,
    pub symbols: Vec<String>,
    pub snapshot_path: String,
    pub alerts_delivered: u64,
    pub alerts_failed: u64,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct Scanner {
    config: EffectiveConfig,
    feed: Box<dyn CandleFeed>,
    alerts: AlertDispatcher,
    options: ScannerOptions,
    state: ScannerState,
    /// Working universe, scanned in this order.
    symbols: Vec<String>,
    cycle: u64,
    no_data_streaks: HashMap<String, u32>,
    last_alert: HashMap<String, Instant>,
    run_id: String,
}

impl Scanner {
    pub fn new(
        config: EffectiveConfig,
        feed: Box<dyn CandleFeed>,
        alerts: AlertDispatcher,
        options: ScannerOptions,
    ) -> Self {
        let symbols = config.symbols.clone();
        Self {
            config,
            feed,
            alerts,
            options,
            state: ScannerState::Idle,
            symbols,
            cycle: 0,
            no_data_streaks: HashMap::new(),
            last_alert: HashMap::new(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycle
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn alerts(&self) -> &AlertDispatcher {
        &self.alerts
    }

    fn transition(&mut self, next: ScannerState) {
        debug!(from = ?self.state, to = ?next, "Scanner state");
        self.state = next;
    }

    /// Run cycles until shutdown or `max_cycles`, then persist the symbol
    /// set and announce maintenance.
    ///
    /// Fails only if the snapshot cannot be written.
    pub async fn run(&mut self, mut shutdown: Shutdown) -> Result<RunSummary> {
        self.transition(ScannerState::Running);
        info!(
            run_id = %self.run_id,
            market = %self.config.scanner.market,
            symbols = self.symbols.len(),
            feed = self.feed.name(),
            sink = self.alerts.sink_name(),
            "Scanner started"
        );

        let notice = format::startup_notice(&self.config.scanner.market, self.symbols.len(), &self.run_id);
        self.dispatch(&notice, &mut shutdown).await;

        loop {
            if shutdown.is_triggered() {
                break;
            }

            let stats = self.run_cycle(&mut shutdown).await;

            self.transition(ScannerState::Reporting);
            stats.report();

            if stats.interrupted {
                info!(cycle = stats.cycle, "Cycle interrupted by shutdown");
                break;
            }
            if let Some(max) = self.options.max_cycles {
                if self.cycle >= max {
                    info!(cycles = self.cycle, "Reached cycle limit");
                    break;
                }
            }

            self.transition(ScannerState::Sleeping);
            let nap = Duration::from_secs(self.config.scanner.sleep_seconds_between_cycles);
            debug!(secs = nap.as_secs(), "Sleeping until next cycle");
            if !pause(nap, &mut shutdown).await {
                info!("Sleep interrupted by shutdown");
                break;
            }
            self.transition(ScannerState::Running);
        }

        self.shut_down().await
    }

    /// One pass over the working symbol set.
    pub async fn run_cycle(&mut self, shutdown: &mut Shutdown) -> CycleStats {
        self.cycle += 1;
        self.transition(ScannerState::Scanning);

        let started = Instant::now();
        let mut stats = CycleStats::new(self.cycle);
        let spacing = Duration::from_millis(self.config.scanner.request_spacing_ms);
        info!(cycle = self.cycle, symbols = self.symbols.len(), "Starting cycle");

        let symbols = self.symbols.clone();
        for (i, symbol) in symbols.iter().enumerate() {
            if shutdown.is_triggered() {
                stats.interrupted = true;
                break;
            }
            if i > 0 && !spacing.is_zero() && !pause(spacing, shutdown).await {
                stats.interrupted = true;
                break;
            }

            match self.scan_symbol(symbol, shutdown).await {
                Some(outcome) => {
                    self.track_no_data(symbol, matches!(outcome, SymbolOutcome::NoData));
                    stats.record(symbol, &outcome);
                }
                None => {
                    stats.interrupted = true;
                    break;
                }
            }
        }

        stats.pruned_symbols = self.prune();
        stats.elapsed = started.elapsed();
        stats
    }

    /// Fetch, classify and (maybe) alert for one symbol.
    /// `None` means shutdown arrived before the fetch completed.
    async fn scan_symbol(&mut self, symbol: &str, shutdown: &mut Shutdown) -> Option<SymbolOutcome> {
        let interval = self.config.scanner.candle_interval_seconds;
        let lookback = self.config.scanner.lookback_candles;

        let result = tokio::select! {
            r = self.feed.fetch_candles(symbol, interval, lookback) => r,
            _ = shutdown.wait() => return None,
        };

        let candles = match result {
            Ok(candles) if candles.is_empty() => {
                symbol_log!(self.options.verbose, symbol, "No data");
                return Some(SymbolOutcome::NoData);
            }
            Ok(candles) => candles,
            Err(e) => {
                warn!(symbol, error = %e, "Fetch failed");
                let text = format::failure_alert(symbol, &e);
                let alert = self.dispatch(&text, shutdown).await;
                return Some(SymbolOutcome::Failure { error: e, alert });
            }
        };

        let hits = strategy::evaluate_bands(
            &candles,
            &self.config.bands,
            self.config.scanner.abs_volume_min_usd,
            self.config.scanner.simple_mode,
        );
        let fired = strategy::fired(&hits);

        symbol_log!(
            self.options.verbose,
            symbol,
            candles = candles.len(),
            last_close = candles.last().map(|c| c.close).unwrap_or_default(),
            fired = fired.len(),
            "Scanned"
        );

        if fired.is_empty() {
            return Some(SymbolOutcome::Success {
                fired: 0,
                alert: AlertAction::None,
            });
        }

        let bands: Vec<&str> = fired.iter().map(|h| h.band.as_str()).collect();
        info!(symbol, bands = ?bands, "Breakout detected");

        if self.cooling_down(symbol) {
            debug!(symbol, "Alert suppressed by cooldown");
            return Some(SymbolOutcome::Success {
                fired: fired.len(),
                alert: AlertAction::Suppressed,
            });
        }

        let window = breakout::summarize_window(&candles).unwrap_or(breakout::WindowSummary {
            change_pct: 0.0,
            range_pct: 0.0,
        });
        let last_timestamp = candles.last().map(|c| c.timestamp).unwrap_or_default();
        let text = format::breakout_alert(symbol, interval, last_timestamp, &window, &fired);
        let fired_count = fired.len();

        let alert = self.dispatch(&text, shutdown).await;
        if alert == AlertAction::Sent {
            self.last_alert.insert(symbol.to_string(), Instant::now());
        }

        Some(SymbolOutcome::Success {
            fired: fired_count,
            alert,
        })
    }

    fn cooling_down(&self, symbol: &str) -> bool {
        let cooldown = self.config.scanner.alert_cooldown_seconds;
        if cooldown == 0 {
            return false;
        }
        self.last_alert
            .get(symbol)
            .is_some_and(|at| at.elapsed() < Duration::from_secs(cooldown))
    }

    fn track_no_data(&mut self, symbol: &str, no_data: bool) {
        if no_data {
            *self.no_data_streaks.entry(symbol.to_string()).or_insert(0) += 1;
        } else {
            self.no_data_streaks.remove(symbol);
        }
    }

    /// Drop symbols whose no-data streak reached the limit. The last
    /// remaining symbol is never pruned.
    fn prune(&mut self) -> Vec<String> {
        let limit = self.config.scanner.prune_after_no_data_cycles;
        if limit == 0 {
            return Vec::new();
        }

        let stale: Vec<String> = self
            .symbols
            .iter()
            .filter(|s| self.no_data_streaks.get(*s).is_some_and(|n| *n >= limit))
            .cloned()
            .collect();

        if stale.is_empty() {
            return Vec::new();
        }
        if stale.len() >= self.symbols.len() {
            warn!(symbols = ?stale, "Every symbol is stale; keeping the universe as is");
            return Vec::new();
        }

        self.symbols.retain(|s| !stale.contains(s));
        for s in &stale {
            self.no_data_streaks.remove(s);
            self.last_alert.remove(s);
        }
        stale
    }

    /// Send an alert unless shutdown arrives first. `Sent` means the
    /// delivery attempt ran to completion, successful or not.
    async fn dispatch(&mut self, text: &str, shutdown: &mut Shutdown) -> AlertAction {
        tokio::select! {
            _ = self.alerts.send(text) => AlertAction::Sent,
            _ = shutdown.wait() => {
                debug!("Alert abandoned on shutdown");
                AlertAction::Abandoned
            }
        }
    }

    async fn shut_down(&mut self) -> Result<RunSummary> {
        self.transition(ScannerState::ShuttingDown);

        let path = self.config.scanner.snapshot_path.clone();
        let saved = storage::save_snapshot(&self.symbols, &path);
        match &saved {
            Ok(()) => info!(path = %path, symbols = self.symbols.len(), "Symbol snapshot written"),
            Err(e) => error!(path = %path, error = %e, "Failed to write symbol snapshot"),
        }

        // Bounded by the HTTP client timeout, not by shutdown.
        let notice = format::maintenance_notice(&self.config.scanner.market, self.symbols.len());
        self.alerts.send(&notice).await;

        self.transition(ScannerState::Terminated);
        saved?;

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            cycles: self.cycle,
            symbols: self.symbols.clone(),
            snapshot_path: path,
            alerts_delivered: self.alerts.delivered(),
            alerts_failed: self.alerts.failed(),
        };
        info!(
            run_id = %summary.run_id,
            cycles = summary.cycles,
            delivered = summary.alerts_delivered,
            failed = summary.alerts_failed,
            "Scanner shut down cleanly"
        );
        Ok(summary)
    }
}

/// Sleep for `duration`. Returns false if shutdown cut it short.
async fn pause(duration: Duration, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.wait() => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
