//! Shared types for the breakout scanner.
//!
//! These types form the data model used across all modules: candles
//! coming out of the feed, band parameters and results flowing through
//! the evaluator, and the merged configuration the engine runs on.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// One OHLCV aggregate for a single interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Interval start, seconds since epoch.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Build a candle where open/high/low all sit at the close.
    /// Handy for synthetic series in tests and fixtures.
    pub fn flat(timestamp: i64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

/// The three independently parameterised lookback windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandName {
    Fast,
    Medium,
    Slow,
}

impl BandName {
    pub const ALL: [BandName; 3] = [BandName::Fast, BandName::Medium, BandName::Slow];

    pub fn as_str(&self) -> &'static str {
        match self {
            BandName::Fast => "fast",
            BandName::Medium => "medium",
            BandName::Slow => "slow",
        }
    }
}

impl fmt::Display for BandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breakout rule for one band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandParameters {
    /// Number of most recent candles the rule looks at.
    pub window_size: usize,
    /// Required close above the prior high, as a fraction (0.01 = 1%).
    pub breakout_threshold_pct: f64,
    /// Required last volume as a multiple of the prior average.
    pub volume_spike_ratio: f64,
}

/// Parameters for all three bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSet {
    pub fast: BandParameters,
    pub medium: BandParameters,
    pub slow: BandParameters,
}

impl BandSet {
    pub fn get(&self, band: BandName) -> &BandParameters {
        match band {
            BandName::Fast => &self.fast,
            BandName::Medium => &self.medium,
            BandName::Slow => &self.slow,
        }
    }

    /// Bands in evaluation order (fast → medium → slow).
    pub fn iter(&self) -> impl Iterator<Item = (BandName, &BandParameters)> {
        BandName::ALL.into_iter().map(move |b| (b, self.get(b)))
    }
}

/// Result of evaluating one band against one symbol's candles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandHit {
    pub band: BandName,
    /// Candles actually inside the evaluated window.
    pub window_used: usize,
    pub last_close: f64,
    pub max_high_before_last: f64,
    /// Percent (not fraction) the last close sits above the prior high.
    pub pct_over_max: f64,
    pub last_volume: f64,
    pub avg_volume_before_last: f64,
    pub volume_multiple: f64,
    /// Quote-currency notional of the last candle.
    pub dollars_per_minute: f64,
    pub fired: bool,
}

impl BandHit {
    /// A non-firing result with every derived metric zeroed.
    pub fn empty(band: BandName, window_used: usize) -> Self {
        Self {
            band,
            window_used,
            last_close: 0.0,
            max_high_before_last: 0.0,
            pct_over_max: 0.0,
            last_volume: 0.0,
            avg_volume_before_last: 0.0,
            volume_multiple: 0.0,
            dollars_per_minute: 0.0,
            fired: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Effective configuration
// ---------------------------------------------------------------------------

/// Scanner knobs after merging market overrides onto global defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannerParameters {
    pub market: String,
    pub candle_interval_seconds: u64,
    pub lookback_candles: usize,
    pub abs_volume_min_usd: f64,
    /// Evaluate the fast band only.
    pub simple_mode: bool,
    pub sleep_seconds_between_cycles: u64,
    /// Fixed pause between consecutive symbol fetches.
    pub request_spacing_ms: u64,
    /// Minimum gap between two breakout alerts for the same symbol (0 = off).
    pub alert_cooldown_seconds: u64,
    /// Drop a symbol after this many consecutive no-data cycles (0 = never).
    pub prune_after_no_data_cycles: u32,
    pub snapshot_path: String,
}

/// The fully merged, immutable parameter set and symbol universe for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub scanner: ScannerParameters,
    pub bands: BandSet,
    /// Upper-cased, deduplicated, ordinal-sorted.
    pub symbols: Vec<String>,
}

impl fmt::Display for EffectiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} symbols | {}s candles x{} | floor ${:.0} | bands {}/{}/{}{}",
            self.scanner.market,
            self.symbols.len(),
            self.scanner.candle_interval_seconds,
            self.scanner.lookback_candles,
            self.scanner.abs_volume_min_usd,
            self.bands.fast.window_size,
            self.bands.medium.window_size,
            self.bands.slow.window_size,
            if self.scanner.simple_mode { " (simple)" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
