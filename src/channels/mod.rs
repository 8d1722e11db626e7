//! Messaging gateway: the channel abstraction, the Discord adapter, chat
//! commands and the background gateway task.

pub mod channel;
pub mod commands;
pub mod discord;
pub mod gateway;

pub use channel::*;
pub use commands::{CommandHandler, CommandTable, DieCommand, PingCommand};
pub use discord::DiscordChannel;
pub use gateway::spawn_gateway;
