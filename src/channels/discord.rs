//! Discord channel: REST delivery of notification embeds and polling of
//! the relay channel for prefix commands.
//!
//! Talks to the HTTP API directly (no websocket gateway): readiness is a
//! successful `GET /users/@me`, commands are read by paging
//! `GET /channels/{id}/messages?after=<cursor>`.

use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::channels::channel::{Channel, IncomingCommand, NotificationPayload};
use crate::error::ChannelError;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Maximum embed description length accepted by Discord.
const DISCORD_MAX_DESCRIPTION_LENGTH: usize = 4096;

/// Messages fetched per command poll.
const COMMAND_PAGE_SIZE: u32 = 50;

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    #[serde(default)]
    content: String,
    author: DiscordUser,
}

/// Discord channel bound to one text channel.
pub struct DiscordChannel {
    bot_token: SecretString,
    channel_id: u64,
    command_prefix: String,
    client: reqwest::Client,
    base_url: String,
    /// Our own user id, set on connect.
    bot_user_id: Mutex<Option<String>>,
    /// Newest message id already inspected for commands.
    cursor: Mutex<Option<String>>,
}

impl DiscordChannel {
    pub fn new(bot_token: SecretString, channel_id: u64, command_prefix: impl Into<String>) -> Self {
        Self {
            bot_token,
            channel_id,
            command_prefix: command_prefix.into(),
            client: reqwest::Client::new(),
            base_url: DISCORD_API_BASE.to_string(),
            bot_user_id: Mutex::new(None),
            cursor: Mutex::new(None),
        }
    }

    /// Point at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn messages_url(&self) -> String {
        self.api_url(&format!("channels/{}/messages", self.channel_id))
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token.expose_secret())
    }

    fn set_cursor(&self, id: String) {
        if let Ok(mut guard) = self.cursor.lock() {
            *guard = Some(id);
        }
    }

    fn cursor(&self) -> Option<String> {
        self.cursor.lock().ok().and_then(|g| g.clone())
    }

    fn is_own_message(&self, author_id: &str) -> bool {
        self.bot_user_id
            .lock()
            .ok()
            .is_some_and(|g| g.as_deref() == Some(author_id))
    }

    /// Map a non-success status to a channel error.
    async fn status_error(&self, resp: reqwest::Response, action: &str) -> ChannelError {
        let status = resp.status();
        match status {
            reqwest::StatusCode::NOT_FOUND => ChannelError::ChannelNotFound {
                name: "discord".into(),
                destination: self.channel_id.to_string(),
            },
            reqwest::StatusCode::TOO_MANY_REQUESTS => ChannelError::RateLimited {
                name: "discord".into(),
            },
            _ => {
                let body = resp.text().await.unwrap_or_default();
                ChannelError::SendFailed {
                    name: "discord".into(),
                    reason: format!("{action} returned {status}: {body}"),
                }
            }
        }
    }

    async fn get_messages(&self, query: &[(&str, String)]) -> Result<Vec<DiscordMessage>, ChannelError> {
        let resp = self
            .client
            .get(self.messages_url())
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(query)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(self.status_error(resp, "get messages").await);
        }

        resp.json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))
    }

    async fn post_message(&self, body: &serde_json::Value, action: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.messages_url())
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(self.status_error(resp, action).await)
        }
    }

    /// Remember the newest existing message so old commands are not replayed.
    async fn prime_cursor(&self) -> Result<(), ChannelError> {
        let latest = self.get_messages(&[("limit", "1".to_string())]).await?;
        let newest = latest.into_iter().next().map_or_else(|| "0".to_string(), |m| m.id);
        self.set_cursor(newest);
        Ok(())
    }
}

/// Render a payload as a Discord embed message body.
pub fn embed_body(payload: &NotificationPayload) -> serde_json::Value {
    let description: String = payload
        .description
        .chars()
        .take(DISCORD_MAX_DESCRIPTION_LENGTH)
        .collect();

    let fields: Vec<serde_json::Value> = payload
        .fields
        .iter()
        .map(|f| {
            serde_json::json!({
                "name": f.name,
                "value": f.value,
                "inline": f.inline,
            })
        })
        .collect();

    serde_json::json!({
        "embeds": [{
            "title": payload.title,
            "description": description,
            "color": payload.color,
            "fields": fields,
            "timestamp": payload.timestamp.to_rfc3339(),
            "footer": { "text": payload.footer },
        }]
    })
}

fn snowflake(id: &str) -> u64 {
    id.parse().unwrap_or(0)
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("users/@me"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChannelError::StartupFailed {
                name: "discord".into(),
                reason: format!("users/@me returned {}", resp.status()),
            });
        }

        let me: DiscordUser = resp.json().await.map_err(|e| ChannelError::StartupFailed {
            name: "discord".into(),
            reason: e.to_string(),
        })?;
        tracing::info!("Logged in as {} ({})", me.username, me.id);

        if let Ok(mut guard) = self.bot_user_id.lock() {
            *guard = Some(me.id);
        }

        if let Err(e) = self.prime_cursor().await {
            // Retried on the first command poll.
            tracing::warn!(error = %e, "Could not read latest Discord message");
        }
        Ok(())
    }

    async fn send_notification(&self, payload: &NotificationPayload) -> Result<(), ChannelError> {
        self.post_message(&embed_body(payload), "send embed").await?;
        tracing::info!(channel_id = self.channel_id, "Message sent to Discord");
        Ok(())
    }

    async fn poll_commands(&self) -> Result<Vec<IncomingCommand>, ChannelError> {
        let Some(after) = self.cursor() else {
            self.prime_cursor().await?;
            return Ok(Vec::new());
        };

        let mut messages = self
            .get_messages(&[("after", after), ("limit", COMMAND_PAGE_SIZE.to_string())])
            .await?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        // Discord returns newest first.
        messages.sort_by_key(|m| snowflake(&m.id));
        if let Some(last) = messages.last() {
            self.set_cursor(last.id.clone());
        }

        Ok(messages
            .into_iter()
            .filter(|m| !m.author.bot && !self.is_own_message(&m.author.id))
            .filter_map(|m| {
                IncomingCommand::parse(m.id, m.author.username, &m.content, &self.command_prefix)
            })
            .collect())
    }

    async fn reply(&self, command: &IncomingCommand, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "content": text,
            "message_reference": { "message_id": command.message_id },
        });
        self.post_message(&body, "reply").await
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Discord channel shutting down");
        Ok(())
    }
}
