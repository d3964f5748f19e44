//! Breakout detection over a single band window.
//!
//! A band fires when the last close clears the prior high by the band's
//! threshold, the last volume beats the prior average by the spike ratio,
//! and the last candle's notional meets the absolute dollar floor.

use crate::types::{BandHit, BandName, BandParameters, Candle};

/// Fewest candles a window needs before the rule is applied.
pub const MIN_WINDOW_CANDLES: usize = 3;

/// Score the most recent `params.window_size` candles against the rule.
///
/// `candles` must be ascending by time. Windows shorter than
/// [`MIN_WINDOW_CANDLES`] return a zeroed, non-firing hit.
pub fn evaluate(
    band: BandName,
    candles: &[Candle],
    params: &BandParameters,
    abs_volume_min_usd: f64,
) -> BandHit {
    let start = candles.len().saturating_sub(params.window_size);
    let window = &candles[start..];

    let (last, prior) = match window.split_last() {
        Some((last, prior)) if window.len() >= MIN_WINDOW_CANDLES => (last, prior),
        _ => return BandHit::empty(band, window.len()),
    };

    let max_high_before_last = prior.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let avg_volume_before_last = prior.iter().map(|c| c.volume).sum::<f64>() / prior.len() as f64;

    let last_close = last.close;
    let last_volume = last.volume;
    let dollars_per_minute = last_volume * last_close;

    let pct_over_max = if max_high_before_last > 0.0 {
        (last_close / max_high_before_last - 1.0) * 100.0
    } else {
        0.0
    };
    let volume_multiple = if avg_volume_before_last > 0.0 {
        last_volume / avg_volume_before_last
    } else {
        0.0
    };

    let price_ok = last_close > max_high_before_last * (1.0 + params.breakout_threshold_pct);
    let volume_ok = last_volume > avg_volume_before_last * params.volume_spike_ratio;
    let notional_ok = dollars_per_minute >= abs_volume_min_usd;

    BandHit {
        band,
        window_used: window.len(),
        last_close,
        max_high_before_last,
        pct_over_max,
        last_volume,
        avg_volume_before_last,
        volume_multiple,
        dollars_per_minute,
        fired: price_ok && volume_ok && notional_ok,
    }
}

/// Shape of the whole fetched window, reported alongside a breakout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    /// First close → last close, in percent.
    pub change_pct: f64,
    /// (max high − min low) / last close, in percent.
    pub range_pct: f64,
}

pub fn summarize_window(candles: &[Candle]) -> Option<WindowSummary> {
    let first = candles.first()?;
    let last = candles.last()?;

    let max_high = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let min_low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);

    let change_pct = if first.close > 0.0 {
        (last.close / first.close - 1.0) * 100.0
    } else {
        0.0
    };
    let range_pct = if last.close > 0.0 {
        (max_high - min_low) / last.close * 100.0
    } else {
        0.0
    };

    Some(WindowSummary {
        change_pct,
        range_pct,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
