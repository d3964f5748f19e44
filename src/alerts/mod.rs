//! Alert delivery.
//!
//! `AlertSink` is the outbound channel (a Discord-style webhook in
//! production, a log-only sink when no webhook is configured).
//! `AlertDispatcher` wraps a sink with the best-effort contract: failures
//! are logged and counted, never returned to the scan loop.

pub mod format;
pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    #[error("alert channel unreachable: {0}")]
    Transport(String),

    #[error("alert rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound notification channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn post_message(&self, text: &str) -> Result<(), DeliveryError>;

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

/// Sink used when no webhook resolves: alerts only reach the log.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn post_message(&self, text: &str) -> Result<(), DeliveryError> {
        info!(alert = %text, "Alert (log only)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Best-effort alert sender. No retries; a dropped alert is lost.
pub struct AlertDispatcher {
    sink: Box<dyn AlertSink>,
    delivered: u64,
    failed: u64,
}

impl AlertDispatcher {
    pub fn new(sink: Box<dyn AlertSink>) -> Self {
        Self {
            sink,
            delivered: 0,
            failed: 0,
        }
    }

    /// Send one message. Delivery failures are logged and swallowed.
    pub async fn send(&mut self, text: &str) {
        match self.sink.post_message(text).await {
            Ok(()) => self.delivered += 1,
            Err(e) => {
                self.failed += 1;
                warn!(sink = self.sink.name(), error = %e, "Alert delivery failed");
            }
        }
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
