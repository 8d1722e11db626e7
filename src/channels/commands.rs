//! Chat command dispatch table.
//!
//! The gateway adapter owns a [`CommandTable`] and routes every parsed
//! command through it; the relay pipeline never sees these handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::channels::channel::{Channel, IncomingCommand};
use crate::error::ChannelError;
use crate::worker::shutdown::ShutdownHandle;

/// Reply to the `ping` command.
pub const PING_REPLY: &str = "Hello I'm ponging!";

/// Reply to the `die` command, sent before shutdown.
pub const DIE_REPLY: &str = "You kill me, but I will rise as a phoenix! 🔥🦅✨";

/// Handler for one chat command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        command: &IncomingCommand,
        channel: &dyn Channel,
    ) -> Result<(), ChannelError>;
}

/// Command name → handler.
#[derive(Default, Clone)]
pub struct CommandTable {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ping` and `die`, with `die` wired to the given shutdown handle.
    pub fn standard(shutdown: ShutdownHandle) -> Self {
        let mut table = Self::new();
        table.register("ping", Arc::new(PingCommand));
        table.register("die", Arc::new(DieCommand::new(shutdown)));
        table
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(name.to_lowercase(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Route a command to its handler. Returns `false` for unknown commands.
    pub async fn dispatch(&self, command: &IncomingCommand, channel: &dyn Channel) -> bool {
        let Some(handler) = self.get(&command.name) else {
            tracing::debug!(command = %command.name, "Ignoring unknown command");
            return false;
        };

        tracing::info!(command = %command.name, author = %command.author, "Received command");
        if let Err(e) = handler.handle(command, channel).await {
            tracing::error!(command = %command.name, error = %e, "Command handler failed");
        }
        true
    }
}

/// Liveness check.
pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    async fn handle(
        &self,
        command: &IncomingCommand,
        channel: &dyn Channel,
    ) -> Result<(), ChannelError> {
        channel.reply(command, PING_REPLY).await
    }
}

/// Acknowledge, then stop the relay.
pub struct DieCommand {
    shutdown: ShutdownHandle,
}

impl DieCommand {
    pub fn new(shutdown: ShutdownHandle) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl CommandHandler for DieCommand {
    async fn handle(
        &self,
        command: &IncomingCommand,
        channel: &dyn Channel,
    ) -> Result<(), ChannelError> {
        let reply = channel.reply(command, DIE_REPLY).await;
        // Shut down even if the acknowledgement could not be sent.
        self.shutdown.trigger();
        reply
    }
}
