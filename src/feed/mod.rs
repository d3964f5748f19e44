//! Market-data feeds.
//!
//! Defines the `CandleFeed` trait the engine fetches through, and the
//! Coinbase Exchange REST implementation used in production.

pub mod coinbase;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Candle;

/// Why a single symbol's fetch failed. Always recoverable at symbol
/// granularity; the cycle moves on to the next symbol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The request could not be built from the given parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Source of recent candles for one symbol.
///
/// An empty `Ok` means "no data for this symbol", which callers count
/// separately from errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandleFeed: Send + Sync {
    /// Fetch the last `lookback` candles at `interval_secs` granularity,
    /// ascending by timestamp.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval_secs: u64,
        lookback: usize,
    ) -> Result<Vec<Candle>, FetchError>;

    /// Feed name for logging.
    fn name(&self) -> &'static str;
}

/// Sort ascending by timestamp and keep the most recent `lookback` candles.
pub fn normalize(mut candles: Vec<Candle>, lookback: usize) -> Vec<Candle> {
    candles.sort_by_key(|c| c.timestamp);
    let excess = candles.len().saturating_sub(lookback);
    candles.drain(..excess);
    candles
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
