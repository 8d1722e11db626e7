//! Messaging gateway abstraction.
//!
//! The relay core only needs three things from a chat gateway: a way to
//! know it is connected, a way to deliver a formatted notification, and a
//! stream of inbound commands. Everything else (auth, reconnects, rate
//! limits) stays inside the adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// One named field of a notification card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Formatted notification handed to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    /// Message text; may contain embedded newlines.
    pub description: String,
    /// RGB colour of the card accent.
    pub color: u32,
    pub fields: Vec<PayloadField>,
    pub timestamp: DateTime<Utc>,
    pub footer: String,
}

impl NotificationPayload {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&PayloadField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A command message received from the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCommand {
    /// Gateway-native id of the message carrying the command.
    pub message_id: String,
    /// Display name of whoever sent it.
    pub author: String,
    /// Command name without prefix, lowercased (e.g. `ping`).
    pub name: String,
    /// Remaining text after the command name.
    pub args: String,
}

impl IncomingCommand {
    /// Parse `<prefix><name> [args]`. Returns `None` for ordinary chat text.
    pub fn parse(
        message_id: impl Into<String>,
        author: impl Into<String>,
        text: &str,
        prefix: &str,
    ) -> Option<Self> {
        let rest = text.trim().strip_prefix(prefix)?;
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        if name.is_empty() {
            return None;
        }

        Some(Self {
            message_id: message_id.into(),
            author: author.into(),
            name: name.to_lowercase(),
            args: args.to_string(),
        })
    }
}

/// A chat gateway the relay delivers notifications to.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g. "discord").
    fn name(&self) -> &str;

    /// Establish the connection. `Ok` means the gateway is ready for delivery.
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Deliver a notification to the configured destination.
    async fn send_notification(&self, payload: &NotificationPayload) -> Result<(), ChannelError>;

    /// Fetch commands received since the last call.
    async fn poll_commands(&self) -> Result<Vec<IncomingCommand>, ChannelError>;

    /// Reply to a command with plain text.
    async fn reply(&self, command: &IncomingCommand, text: &str) -> Result<(), ChannelError>;

    /// Release any resources held by the connection.
    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
