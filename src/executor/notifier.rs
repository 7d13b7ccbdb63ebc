//! Destination side: delivering rendered messages.
//!
//! [`Notifier`] is the capability the poll cycle sends through. Two
//! implementations ship with the crate:
//! - [`DiscordNotifier`] posts an embed to a channel through the bot REST API;
//! - [`DryRunNotifier`] only logs what would have been sent.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::render::RenderedMessage;
use crate::error::NotifyError;
use crate::utils::text::truncate;

pub const DEFAULT_DISCORD_API: &str = "https://discord.com/api/v10";

/// Embed limits enforced by the destination.
const EMBED_TITLE_LIMIT: usize = 256;
const EMBED_DESCRIPTION_LIMIT: usize = 4096;
const EMBED_AUTHOR_LIMIT: usize = 256;
const EMBED_FOOTER_LIMIT: usize = 2048;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Verify the destination is reachable. Called once at startup.
    async fn connect(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), NotifyError>;

    /// Release the destination connection. Called once at shutdown.
    async fn close(&self) {}
}

/// Build the embed JSON for `message`, clamping fields to the destination's
/// limits.
pub fn embed_payload(message: &RenderedMessage) -> Value {
    let mut embed = json!({
        "color": message.color,
        "title": truncate(Some(&message.title), EMBED_TITLE_LIMIT),
        "author": {
            "name": truncate(Some(&message.author_name), EMBED_AUTHOR_LIMIT),
            "url": message.author_url,
        },
        "footer": { "text": truncate(Some(&message.footer_text), EMBED_FOOTER_LIMIT) },
        "timestamp": message.timestamp.to_rfc3339(),
    });
    if let Some(icon) = &message.author_icon_url {
        embed["author"]["icon_url"] = json!(icon);
    }
    if let Some(url) = &message.url {
        embed["url"] = json!(url);
    }
    if let Some(description) = &message.description {
        embed["description"] = json!(truncate(Some(description), EMBED_DESCRIPTION_LIMIT));
    }
    json!({ "embeds": [embed] })
}

/// Posts messages to a Discord channel as a bot user.
pub struct DiscordNotifier {
    client: reqwest::Client,
    token: String,
    channel_id: String,
    api_root: String,
}

impl DiscordNotifier {
    pub fn new(token: String, channel_id: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            token,
            channel_id,
            api_root: DEFAULT_DISCORD_API.to_string(),
        })
    }

    pub fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = api_root.into().trim_end_matches('/').to_string();
        self
    }

    fn channel_url(&self) -> String {
        format!("{}/channels/{}", self.api_root, self.channel_id)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(AUTHORIZATION, format!("Bot {}", self.token)).header(
            USER_AGENT,
            concat!("DiscordBot (", env!("CARGO_PKG_NAME"), ", ", env!("CARGO_PKG_VERSION"), ")"),
        )
    }

    async fn check(resp: reqwest::Response) -> Result<(), NotifyError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn connect(&self) -> Result<(), NotifyError> {
        let resp = self.authorize(self.client.get(self.channel_url())).send().await?;
        Self::check(resp).await?;
        info!(target: "hubcast::notifier", channel = %self.channel_id, "Connected to destination channel");
        Ok(())
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), NotifyError> {
        let url = format!("{}/messages", self.channel_url());
        let resp = self
            .authorize(self.client.post(url))
            .json(&embed_payload(message))
            .send()
            .await?;
        Self::check(resp).await?;
        debug!(target: "hubcast::notifier", title = %message.title, "Message delivered");
        Ok(())
    }

    async fn close(&self) {
        info!(target: "hubcast::notifier", channel = %self.channel_id, "Destination connection closed");
    }
}

/// Logs messages instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct DryRunNotifier;

#[async_trait]
impl Notifier for DryRunNotifier {
    async fn send(&self, message: &RenderedMessage) -> Result<(), NotifyError> {
        info!(
            target: "hubcast::notifier",
            title = %message.title,
            url = ?message.url,
            description = ?message.description,
            "DRY-RUN send"
        );
        Ok(())
    }
}
