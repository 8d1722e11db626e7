//! Mailbox access: search, fetch and the poller that feeds the pipeline.

pub mod auth;
pub mod gmail;
pub mod poller;

use async_trait::async_trait;

use crate::error::MailboxError;
use crate::pipeline::types::RawEmail;

pub use auth::{StaticToken, TokenFile, TokenSource};
pub use gmail::GmailMailbox;
pub use poller::{MailboxPoller, PollQuery};

/// A searchable mailbox.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Ids of messages matching a provider search query.
    async fn search(&self, query: &str) -> Result<Vec<String>, MailboxError>;

    /// Full content of one message.
    async fn fetch(&self, id: &str) -> Result<RawEmail, MailboxError>;
}
