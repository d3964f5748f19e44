//! Per-cycle bookkeeping.
//!
//! Tallies symbol outcomes during a cycle and reports the summary at the
//! end. A fresh `CycleStats` is built for every cycle; nothing carries over.

use std::time::Duration;
use tracing::{info, warn};

use crate::feed::FetchError;

/// What happened to a breakout alert for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    None,
    Sent,
    /// Held back by the per-symbol cooldown.
    Suppressed,
    /// Dropped mid-delivery on shutdown.
    Abandoned,
}

/// Classification of one symbol's scan.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Success { fired: usize, alert: AlertAction },
    NoData,
    Failure { error: FetchError, alert: AlertAction },
}

/// Summary of one full pass over the symbol set.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleStats {
    pub cycle: u64,
    pub success: usize,
    pub no_data: usize,
    pub failed: usize,
    pub failed_symbols: Vec<String>,
    pub no_data_symbols: Vec<String>,
    /// Symbols with at least one fired band.
    pub breakouts: usize,
    /// Breakout and failure alerts whose delivery attempt completed.
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub alerts_abandoned: usize,
    /// Symbols dropped from the working set at the end of this cycle.
    pub pruned_symbols: Vec<String>,
    pub elapsed: Duration,
    /// The cycle stopped early on shutdown.
    pub interrupted: bool,
}

impl CycleStats {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            success: 0,
            no_data: 0,
            failed: 0,
            failed_symbols: Vec::new(),
            no_data_symbols: Vec::new(),
            breakouts: 0,
            alerts_sent: 0,
            alerts_suppressed: 0,
            alerts_abandoned: 0,
            pruned_symbols: Vec::new(),
            elapsed: Duration::ZERO,
            interrupted: false,
        }
    }

    pub fn record(&mut self, symbol: &str, outcome: &SymbolOutcome) {
        match outcome {
            SymbolOutcome::Success { fired, alert } => {
                self.success += 1;
                if *fired > 0 {
                    self.breakouts += 1;
                }
                self.count_alert(*alert);
            }
            SymbolOutcome::NoData => {
                self.no_data += 1;
                self.no_data_symbols.push(symbol.to_string());
            }
            SymbolOutcome::Failure { alert, .. } => {
                self.failed += 1;
                self.failed_symbols.push(symbol.to_string());
                self.count_alert(*alert);
            }
        }
    }

    fn count_alert(&mut self, alert: AlertAction) {
        match alert {
            AlertAction::Sent => self.alerts_sent += 1,
            AlertAction::Suppressed => self.alerts_suppressed += 1,
            AlertAction::Abandoned => self.alerts_abandoned += 1,
            AlertAction::None => {}
        }
    }

    pub fn processed(&self) -> usize {
        self.success + self.no_data + self.failed
    }

    /// Symbols per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed() as f64 / secs
        } else {
            0.0
        }
    }

    /// Log the cycle summary.
    pub fn report(&self) {
        info!(
            cycle = self.cycle,
            processed = self.processed(),
            success = self.success,
            no_data = self.no_data,
            failed = self.failed,
            breakouts = self.breakouts,
            alerts = self.alerts_sent,
            suppressed = self.alerts_suppressed,
            abandoned = self.alerts_abandoned,
            elapsed = format!("{:.2}s", self.elapsed.as_secs_f64()),
            throughput = format!("{:.2}/s", self.throughput()),
            interrupted = self.interrupted,
            "Cycle complete"
        );

        if !self.failed_symbols.is_empty() {
            warn!(cycle = self.cycle, symbols = ?self.failed_symbols, "Failed symbols");
        }
        if !self.no_data_symbols.is_empty() {
            info!(cycle = self.cycle, symbols = ?self.no_data_symbols, "No-data symbols");
        }
        if !self.pruned_symbols.is_empty() {
            warn!(cycle = self.cycle, symbols = ?self.pruned_symbols, "Pruned from universe");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
