//! Discord-compatible webhook poster.
//!
//! `POST <url>` with `{"content": "<text>"}`. Non-2xx responses are
//! reported as `DeliveryError::Rejected`; nothing is retried.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use super::{AlertSink, DeliveryError};

/// Discord rejects message content longer than this.
pub const MAX_CONTENT_CHARS: usize = 2000;

pub struct WebhookClient {
    http: Client,
    url: SecretString,
}

impl WebhookClient {
    /// Wrap a shared HTTP client. Legacy `discordapp.com` hosts are
    /// rewritten to `discord.com`.
    pub fn new(http: Client, url: SecretString) -> Self {
        let url = SecretString::new(normalize_url(url.expose_secret()));
        Self { http, url }
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().replace("discordapp.com", "discord.com")
}

/// Clip to the channel's content limit, marking the cut.
pub fn clip_content(text: &str) -> String {
    if text.chars().count() <= MAX_CONTENT_CHARS {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_CONTENT_CHARS - 1).collect();
    clipped.push('…');
    clipped
}

#[async_trait]
impl AlertSink for WebhookClient {
    async fn post_message(&self, text: &str) -> Result<(), DeliveryError> {
        let payload = json!({ "content": clip_content(text) });

        let resp = self
            .http
            .post(self.url.expose_secret())
            .json(&payload)
            .send()
            .await
            // the URL carries the webhook token
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(220).collect(),
            });
        }

        debug!(status = status.as_u16(), "Webhook delivered");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
