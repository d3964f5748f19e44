//! Breakout Scanner
//!
//! Entry point. Parses the command line, loads and resolves configuration,
//! initialises structured logging, wires the candle feed and alert sink,
//! and runs the scan loop with graceful shutdown.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal, Write};
use std::time::Duration;
use tracing::{info, warn};

use breakout_scanner::alerts::webhook::WebhookClient;
use breakout_scanner::alerts::{AlertDispatcher, AlertSink, LogSink};
use breakout_scanner::config::{self, RawConfig};
use breakout_scanner::engine::shutdown;
use breakout_scanner::engine::{Scanner, ScannerOptions};
use breakout_scanner::feed::coinbase::CoinbaseFeed;
use breakout_scanner::storage::{self, SnapshotDiff};
use breakout_scanner::types::EffectiveConfig;

const BANNER: &str = r#"
  ___               _            _
 | _ )_ _ ___ __ _| |_____ _  _| |_
 | _ \ '_/ -_) _` | / / _ \ || |  _|
 |___/_| \___\__,_|_\_\___/\_,_|\__|

  Multi-band breakout scanner
  v0.1.0
"#;

#[derive(Debug, Parser)]
#[command(name = "breakout-scanner", version, about = "Poll candles, detect breakouts, post alerts")]
struct Cli {
    /// Market to scan (optional when the config defines exactly one)
    #[arg(short, long)]
    market: Option<String>,

    /// Path to the TOML configuration
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dry_run: bool,

    /// Log every symbol at info level
    #[arg(short, long)]
    verbose: bool,

    /// Start without asking for confirmation
    #[arg(short = 'y', long)]
    auto_start: bool,

    /// Webhook selector, overriding the market's choice
    #[arg(long)]
    webhook: Option<String>,

    /// Stop after this many cycles
    #[arg(long)]
    max_cycles: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    // -- Configuration ---------------------------------------------------

    let raw = RawConfig::load(&cli.config)?;
    let effective = config::resolve(&raw, cli.market.as_deref())?;
    let webhook = config::resolve_webhook(&raw, &effective.scanner.market, cli.webhook.as_deref())?;

    if cli.dry_run {
        let json = serde_json::to_string_pretty(&effective).context("Failed to serialise configuration")?;
        println!("{json}");
        return Ok(());
    }

    println!("{BANNER}");
    info!(
        config = %cli.config,
        effective = %effective,
        webhook = webhook.as_ref().map(|w| w.selector.as_str()).unwrap_or("<none>"),
        "Breakout scanner starting up"
    );

    if !cli.auto_start {
        let shown = effective.clone();
        let accepted = tokio::task::spawn_blocking(move || confirm_start(&shown))
            .await
            .context("Confirmation prompt aborted")??;
        if !accepted {
            info!("Start declined");
            return Ok(());
        }
    }

    log_snapshot_diff(&effective);

    // -- Initialise components -------------------------------------------

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(raw.provider.timeout_secs))
        .user_agent(raw.provider.user_agent.as_str())
        .build()
        .context("Failed to build HTTP client")?;

    let feed = CoinbaseFeed::new(http.clone(), raw.provider.base_url.clone());

    let sink: Box<dyn AlertSink> = match webhook {
        Some(w) => {
            info!(selector = %w.selector, "Alerts go to webhook");
            Box::new(WebhookClient::new(http, w.url))
        }
        None => {
            warn!("No webhook configured, alerts will only be logged");
            Box::new(LogSink)
        }
    };

    let mut scanner = Scanner::new(
        effective,
        Box::new(feed),
        AlertDispatcher::new(sink),
        ScannerOptions {
            verbose: cli.verbose,
            max_cycles: cli.max_cycles,
        },
    );

    // -- Main loop -------------------------------------------------------

    let (trigger, stop) = shutdown::channel();
    let listener = shutdown::spawn_signal_listener(trigger);

    info!("Entering main loop. Press Ctrl+C to stop.");
    let summary = scanner.run(stop).await;
    listener.abort();

    let summary = summary?;
    info!(
        cycles = summary.cycles,
        symbols = summary.symbols.len(),
        snapshot = %summary.snapshot_path,
        "Breakout scanner stopped."
    );

    Ok(())
}

/// Ask the operator before entering the loop. Refuses outright when
/// stdin is not a terminal. Blocks on stdin; run it off the runtime.
fn confirm_start(effective: &EffectiveConfig) -> Result<bool> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        bail!("stdin is not interactive; pass --auto-start to run unattended");
    }

    println!("{effective}");
    print!("Start scanning? [y/N] ");
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    stdin.lock().read_line(&mut answer).context("Failed to read confirmation")?;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Log how the universe changed since the last run's snapshot.
fn log_snapshot_diff(effective: &EffectiveConfig) {
    let path = &effective.scanner.snapshot_path;
    match storage::load_snapshot(path) {
        Ok(Some(previous)) => {
            let diff = SnapshotDiff::between(&previous, &effective.symbols);
            if diff.is_empty() {
                info!(path = %path, "Symbol set unchanged since last run");
            } else {
                info!(added = ?diff.added, removed = ?diff.removed, "Symbol set changed since last run");
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable previous snapshot"),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "breakout_scanner=debug" } else { "breakout_scanner=info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json_logging = std::env::var("SCANNER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
