//! inReach relay: forwards Garmin inReach notification emails to a chat
//! channel.

pub mod channels;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod pipeline;
pub mod store;
pub mod worker;
