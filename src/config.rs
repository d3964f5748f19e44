//! Configuration loading and resolution.
//!
//! Reads the TOML document into loosely-typed `Raw*` structs (every
//! override optional), then merges global defaults, the selected market's
//! overrides and the coin lists into one immutable `EffectiveConfig`.
//! Webhook URLs are referenced by env-var name and resolved at runtime.

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use thiserror::Error;
use tracing::{debug, warn};

use crate::feed::coinbase::{MAX_CANDLES_PER_REQUEST, SUPPORTED_GRANULARITIES};
use crate::types::{BandName, BandParameters, BandSet, EffectiveConfig, ScannerParameters};

/// Name of the webhook entry used when neither the CLI nor the market
/// selects one.
pub const DEFAULT_WEBHOOK: &str = "default";

/// Coinbase Exchange public REST endpoint.
pub const DEFAULT_PROVIDER_URL: &str = "https://api.exchange.coinbase.com";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Startup-fatal configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("market '{requested}' not found (available: {available})")]
    MarketNotFound { requested: String, available: String },

    #[error("market '{market}' resolved to an empty symbol set")]
    EmptySymbolSet { market: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Raw document
// ---------------------------------------------------------------------------

/// The configuration document as written on disk.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawConfig {
    /// Coins scanned in every market.
    #[serde(default)]
    pub base_coins: Vec<String>,
    #[serde(default)]
    pub scanner: ScannerDefaults,
    /// Global band defaults; missing fields fall back to built-ins.
    #[serde(default)]
    pub bands: BandOverrides,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub webhooks: HashMap<String, WebhookConfig>,
    #[serde(default)]
    pub markets: BTreeMap<String, MarketConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerDefaults {
    pub candle_interval_seconds: u64,
    pub lookback_candles: usize,
    pub abs_volume_min_usd: f64,
    pub simple_mode: bool,
    pub sleep_seconds_between_cycles: u64,
    pub request_spacing_ms: u64,
    pub alert_cooldown_seconds: u64,
    pub prune_after_no_data_cycles: u32,
    pub snapshot_path: String,
}

impl Default for ScannerDefaults {
    fn default() -> Self {
        Self {
            candle_interval_seconds: 60,
            lookback_candles: 60,
            abs_volume_min_usd: 2000.0,
            simple_mode: false,
            sleep_seconds_between_cycles: 60,
            request_spacing_ms: 0,
            alert_cooldown_seconds: 0,
            prune_after_no_data_cycles: 0,
            snapshot_path: "symbols.snapshot.json".to_string(),
        }
    }
}

/// Per-market scanner overrides. `None` means "use the global default".
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScannerOverrides {
    pub candle_interval_seconds: Option<u64>,
    pub lookback_candles: Option<usize>,
    pub abs_volume_min_usd: Option<f64>,
    pub simple_mode: Option<bool>,
    pub sleep_seconds_between_cycles: Option<u64>,
    pub request_spacing_ms: Option<u64>,
    pub alert_cooldown_seconds: Option<u64>,
    pub prune_after_no_data_cycles: Option<u32>,
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BandOverrides {
    pub fast: Option<BandOverride>,
    pub medium: Option<BandOverride>,
    pub slow: Option<BandOverride>,
}

impl BandOverrides {
    fn get(&self, band: BandName) -> Option<&BandOverride> {
        match band {
            BandName::Fast => self.fast.as_ref(),
            BandName::Medium => self.medium.as_ref(),
            BandName::Slow => self.slow.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BandOverride {
    pub window_size: Option<usize>,
    pub breakout_threshold_pct: Option<f64>,
    pub volume_spike_ratio: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            timeout_secs: 20,
            user_agent: concat!("breakout-scanner/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A webhook target. `url_env` wins over a literal `url`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub url_env: Option<String>,
}

impl WebhookConfig {
    fn resolve_url(&self) -> Option<String> {
        self.url_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .or_else(|| self.url.clone())
            .filter(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MarketConfig {
    #[serde(default)]
    pub coins: Vec<String>,
    /// Selector into the `[webhooks]` table.
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub scanner: ScannerOverrides,
    #[serde(default)]
    pub bands: BandOverrides,
}

impl RawConfig {
    /// Load the document from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Parse a TOML document. `origin` is only used in error messages.
    pub fn from_toml_str(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Market names in ordinal order.
    pub fn market_names(&self) -> Vec<&str> {
        self.markets.keys().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Built-in band parameters used when neither the market nor the global
/// `[bands]` table sets a field.
pub fn builtin_band(band: BandName) -> BandParameters {
    match band {
        BandName::Fast => BandParameters {
            window_size: 5,
            breakout_threshold_pct: 0.010,
            volume_spike_ratio: 1.5,
        },
        BandName::Medium => BandParameters {
            window_size: 15,
            breakout_threshold_pct: 0.015,
            volume_spike_ratio: 1.3,
        },
        BandName::Slow => BandParameters {
            window_size: 30,
            breakout_threshold_pct: 0.020,
            volume_spike_ratio: 1.2,
        },
    }
}

/// Merge the raw document into the effective configuration for one market.
///
/// With no market requested, the only market is auto-selected; anything
/// else is `MarketNotFound`.
pub fn resolve(raw: &RawConfig, requested_market: Option<&str>) -> Result<EffectiveConfig, ConfigError> {
    let (market_name, market) = select_market(raw, requested_market)?;

    let scanner = merge_scanner(market_name, &raw.scanner, &market.scanner);
    let bands = merge_bands(&raw.bands, &market.bands);

    let symbols = build_symbol_set(&raw.base_coins, &market.coins);
    if symbols.is_empty() {
        return Err(ConfigError::EmptySymbolSet {
            market: market_name.to_string(),
        });
    }

    validate(&scanner, &bands)?;

    debug!(
        market = market_name,
        symbols = symbols.len(),
        "Configuration resolved"
    );

    Ok(EffectiveConfig {
        scanner,
        bands,
        symbols,
    })
}

fn select_market<'a>(
    raw: &'a RawConfig,
    requested: Option<&str>,
) -> Result<(&'a str, &'a MarketConfig), ConfigError> {
    let not_found = |requested: &str| ConfigError::MarketNotFound {
        requested: requested.to_string(),
        available: raw.market_names().join(", "),
    };

    match requested {
        Some(name) => raw
            .markets
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| not_found(name)),
        None if raw.markets.len() == 1 => raw
            .markets
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| not_found("<none>")),
        None => Err(not_found("<none>")),
    }
}

fn pick<T: Clone>(over: &Option<T>, base: &T) -> T {
    over.clone().unwrap_or_else(|| base.clone())
}

fn merge_scanner(market: &str, base: &ScannerDefaults, over: &ScannerOverrides) -> ScannerParameters {
    ScannerParameters {
        market: market.to_string(),
        candle_interval_seconds: pick(&over.candle_interval_seconds, &base.candle_interval_seconds),
        lookback_candles: pick(&over.lookback_candles, &base.lookback_candles),
        abs_volume_min_usd: pick(&over.abs_volume_min_usd, &base.abs_volume_min_usd),
        simple_mode: pick(&over.simple_mode, &base.simple_mode),
        sleep_seconds_between_cycles: pick(
            &over.sleep_seconds_between_cycles,
            &base.sleep_seconds_between_cycles,
        ),
        request_spacing_ms: pick(&over.request_spacing_ms, &base.request_spacing_ms),
        alert_cooldown_seconds: pick(&over.alert_cooldown_seconds, &base.alert_cooldown_seconds),
        prune_after_no_data_cycles: pick(
            &over.prune_after_no_data_cycles,
            &base.prune_after_no_data_cycles,
        ),
        snapshot_path: pick(&over.snapshot_path, &base.snapshot_path),
    }
}

fn merge_band(band: BandName, global: &BandOverrides, market: &BandOverrides) -> BandParameters {
    let builtin = builtin_band(band);
    let global = global.get(band);
    let market = market.get(band);

    // market field → global field → built-in
    let layer = |field: fn(&BandOverride) -> Option<f64>, fallback: f64| {
        market
            .and_then(field)
            .or_else(|| global.and_then(field))
            .unwrap_or(fallback)
    };

    BandParameters {
        window_size: market
            .and_then(|b| b.window_size)
            .or_else(|| global.and_then(|b| b.window_size))
            .unwrap_or(builtin.window_size),
        breakout_threshold_pct: layer(|b| b.breakout_threshold_pct, builtin.breakout_threshold_pct),
        volume_spike_ratio: layer(|b| b.volume_spike_ratio, builtin.volume_spike_ratio),
    }
}

fn merge_bands(global: &BandOverrides, market: &BandOverrides) -> BandSet {
    BandSet {
        fast: merge_band(BandName::Fast, global, market),
        medium: merge_band(BandName::Medium, global, market),
        slow: merge_band(BandName::Slow, global, market),
    }
}

/// Union of both coin lists, upper-cased, deduplicated and ordinal-sorted.
pub fn build_symbol_set(base_coins: &[String], market_coins: &[String]) -> Vec<String> {
    base_coins
        .iter()
        .chain(market_coins)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn validate(scanner: &ScannerParameters, bands: &BandSet) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::Invalid(msg));

    if !SUPPORTED_GRANULARITIES.contains(&scanner.candle_interval_seconds) {
        return invalid(format!(
            "candle_interval_seconds must be one of {SUPPORTED_GRANULARITIES:?}, got {}",
            scanner.candle_interval_seconds
        ));
    }
    if scanner.lookback_candles == 0 {
        return invalid("lookback_candles must be positive".into());
    }
    if scanner.lookback_candles > MAX_CANDLES_PER_REQUEST {
        warn!(
            requested = scanner.lookback_candles,
            max = MAX_CANDLES_PER_REQUEST,
            "Lookback exceeds provider limit, fetches will be capped"
        );
    }
    if !scanner.abs_volume_min_usd.is_finite() || scanner.abs_volume_min_usd < 0.0 {
        return invalid(format!(
            "abs_volume_min_usd must be a non-negative number, got {}",
            scanner.abs_volume_min_usd
        ));
    }

    let evaluated: &[BandName] = if scanner.simple_mode {
        &[BandName::Fast]
    } else {
        &BandName::ALL
    };

    for &band in evaluated {
        let p = bands.get(band);
        if p.window_size == 0 {
            return invalid(format!("{band} band window_size must be positive"));
        }
        if !p.breakout_threshold_pct.is_finite() || p.breakout_threshold_pct < 0.0 {
            return invalid(format!("{band} band breakout_threshold_pct must be >= 0"));
        }
        if !p.volume_spike_ratio.is_finite() || p.volume_spike_ratio < 0.0 {
            return invalid(format!("{band} band volume_spike_ratio must be >= 0"));
        }
        if scanner.lookback_candles < p.window_size {
            return invalid(format!(
                "lookback_candles ({}) is smaller than the {band} band window ({})",
                scanner.lookback_candles, p.window_size
            ));
        }
    }

    if !scanner.simple_mode
        && !(bands.fast.window_size <= bands.medium.window_size
            && bands.medium.window_size <= bands.slow.window_size)
    {
        warn!(
            fast = bands.fast.window_size,
            medium = bands.medium.window_size,
            slow = bands.slow.window_size,
            "Band windows are not ordered fast <= medium <= slow"
        );
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Webhook selection
// ---------------------------------------------------------------------------

/// The webhook chosen for a run.
#[derive(Debug, Clone)]
pub struct ResolvedWebhook {
    pub selector: String,
    pub url: SecretString,
}

/// Pick the alert webhook: request-scoped selector, else the market's
/// selector, else the `default` entry.
///
/// Returns `Ok(None)` when nothing is selected or the selected entry has
/// no URL; an explicit selector naming a missing entry is an error.
pub fn resolve_webhook(
    raw: &RawConfig,
    market: &str,
    requested: Option<&str>,
) -> Result<Option<ResolvedWebhook>, ConfigError> {
    let market_selector = raw.markets.get(market).and_then(|m| m.webhook.as_deref());

    let selector = match requested.or(market_selector) {
        Some(explicit) => {
            if !raw.webhooks.contains_key(explicit) {
                return Err(ConfigError::Invalid(format!(
                    "webhook '{explicit}' is not defined under [webhooks]"
                )));
            }
            explicit
        }
        None if raw.webhooks.contains_key(DEFAULT_WEBHOOK) => DEFAULT_WEBHOOK,
        None => return Ok(None),
    };

    let url = raw.webhooks.get(selector).and_then(WebhookConfig::resolve_url);
    if url.is_none() {
        debug!(selector, "Webhook entry has no URL");
    }

    Ok(url.map(|u| ResolvedWebhook {
        selector: selector.to_string(),
        url: SecretString::new(u),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
