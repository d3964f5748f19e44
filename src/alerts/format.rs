//! Alert message text.

use chrono::{DateTime, Utc};

use crate::feed::FetchError;
use crate::strategy::breakout::WindowSummary;
use crate::types::BandHit;

/// Render a dollar amount with thousands separators and no decimals.
pub fn format_usd(amount: f64) -> String {
    let rounded = amount.abs().round() as u64;
    let digits = rounded.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    if amount < 0.0 && rounded > 0 {
        out.push('-');
    }
    out.push('$');
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn utc_hms(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Breakout notification for one symbol. `fired` must be non-empty.
pub fn breakout_alert(
    symbol: &str,
    interval_secs: u64,
    last_timestamp: i64,
    window: &WindowSummary,
    fired: &[&BandHit],
) -> String {
    let price = fired.first().map(|h| h.last_close).unwrap_or_default();

    let mut lines = vec![
        format!("🚀 Breakout: {symbol} ({interval_secs}s)"),
        format!(
            "Price: {price:.6} • Window Δ: {:+.2}% • Range: {:.2}%",
            window.change_pct, window.range_pct
        ),
    ];

    for hit in fired {
        lines.push(format!(
            "• {} ({} bars): {:+.2}% over high • V/avg {:.2}× ({:.2} vs {:.2}) • USD/min {}",
            hit.band,
            hit.window_used,
            hit.pct_over_max,
            hit.volume_multiple,
            hit.last_volume,
            hit.avg_volume_before_last,
            format_usd(hit.dollars_per_minute),
        ));
    }

    lines.push(format!("UTC: {}", utc_hms(last_timestamp)));
    lines.join("\n")
}

pub fn failure_alert(symbol: &str, error: &FetchError) -> String {
    format!("⚠️ Fetch failed: {symbol} — {error}")
}

pub fn startup_notice(market: &str, symbols: usize, run_id: &str) -> String {
    format!("🟢 Scanner online • market {market} • {symbols} symbols • run {run_id}")
}

pub fn maintenance_notice(market: &str, symbols: usize) -> String {
    format!(
        "🛠️ Scanner temporarily down for maintenance • market {market} • {symbols} symbols saved"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
