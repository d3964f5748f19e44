//! Coinbase Exchange public candles.
//!
//! API: `GET /products/{product_id}/candles?granularity=&start=&end=`
//! Rows are `[time, low, high, open, close, volume]`, newest first.
//! Auth: not required. One request returns at most 300 candles.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{normalize, CandleFeed, FetchError};
use crate::types::Candle;

const FEED_NAME: &str = "coinbase";

/// Provider cap on candles per request.
pub const MAX_CANDLES_PER_REQUEST: usize = 300;

/// Candle granularities the provider accepts, in seconds.
pub const SUPPORTED_GRANULARITIES: [u64; 6] = [60, 300, 900, 3600, 21600, 86400];

/// Longest error body carried into a `FetchError`.
const MAX_ERROR_BODY: usize = 300;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// One candle row: `[time, low, high, open, close, volume]`.
#[derive(Debug, Deserialize)]
struct CandleRow(f64, f64, f64, f64, f64, f64);

impl From<CandleRow> for Candle {
    fn from(row: CandleRow) -> Self {
        let CandleRow(time, low, high, open, close, volume) = row;
        Candle {
            timestamp: time as i64,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Candle feed backed by the Coinbase Exchange REST API.
pub struct CoinbaseFeed {
    http: Client,
    base_url: String,
}

impl CoinbaseFeed {
    /// Wrap a shared HTTP client. `base_url` has no trailing slash.
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn candles_url(&self, symbol: &str) -> String {
        format!(
            "{}/products/{}/candles",
            self.base_url,
            urlencoding::encode(symbol)
        )
    }

    /// Parse a candles response body. Does not sort.
    pub fn parse_candles(body: &str) -> Result<Vec<Candle>, FetchError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| FetchError::Malformed(format!("invalid JSON: {e}")))?;

        // Errors come back as `{"message": "..."}`, sometimes with a 200.
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return Err(FetchError::Malformed(format!("provider error: {message}")));
        }

        let rows: Vec<CandleRow> = serde_json::from_value(value)
            .map_err(|e| FetchError::Malformed(format!("unexpected candle shape: {e}")))?;

        Ok(rows.into_iter().map(Candle::from).collect())
    }
}

/// Oversized lookbacks are flagged once at config time; here they are
/// silently capped.
fn clamp_lookback(lookback: usize) -> usize {
    lookback.min(MAX_CANDLES_PER_REQUEST)
}

/// `[end - interval * lookback, end]`, or `InvalidRequest` when the span
/// does not fit a timestamp.
fn request_window(
    end: DateTime<Utc>,
    interval_secs: u64,
    lookback: usize,
) -> Result<(DateTime<Utc>, DateTime<Utc>), FetchError> {
    let start = interval_secs
        .checked_mul(lookback as u64)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(TimeDelta::try_seconds)
        .and_then(|span| end.checked_sub_signed(span))
        .ok_or_else(|| {
            FetchError::InvalidRequest(format!(
                "{lookback} candles of {interval_secs}s reach outside the supported time range"
            ))
        })?;
    Ok((start, end))
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}

#[async_trait]
impl CandleFeed for CoinbaseFeed {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval_secs: u64,
        lookback: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let lookback = clamp_lookback(lookback);
        let (start, end) = request_window(Utc::now(), interval_secs, lookback)?;

        let url = self.candles_url(symbol);
        debug!(url = %url, symbol, interval_secs, lookback, "Fetching candles");

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("granularity", interval_secs.to_string()),
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        let candles = Self::parse_candles(&body)?;
        Ok(normalize(candles, lookback))
    }

    fn name(&self) -> &'static str {
        FEED_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
