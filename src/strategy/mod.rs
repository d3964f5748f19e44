//! Strategy — multi-band breakout evaluation.

pub mod breakout;

use crate::types::{BandHit, BandName, BandSet, Candle};

/// Evaluate every active band against one symbol's candles.
///
/// Bands come back in fast → medium → slow order. Simple mode runs the
/// fast band only.
pub fn evaluate_bands(
    candles: &[Candle],
    bands: &BandSet,
    abs_volume_min_usd: f64,
    simple_mode: bool,
) -> Vec<BandHit> {
    bands
        .iter()
        .filter(|(band, _)| !simple_mode || *band == BandName::Fast)
        .map(|(band, params)| breakout::evaluate(band, candles, params, abs_volume_min_usd))
        .collect()
}

/// Bands that fired, in evaluation order.
pub fn fired(hits: &[BandHit]) -> Vec<&BandHit> {
    hits.iter().filter(|h| h.fired).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
