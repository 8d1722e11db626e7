//! Error types for the inReach relay.

use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox (search / fetch / credential) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Mailbox request {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Mailbox rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Invalid mailbox response: {0}")]
    InvalidResponse(String),

    #[error("Failed to decode message body: {0}")]
    Decode(String),
}

/// Processed-id ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger {path} IO error: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid message id for ledger: {0:?}")]
    InvalidId(String),
}

/// Messaging gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Channel {name} could not resolve destination {destination}")]
    ChannelNotFound { name: String, destination: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Rate limited on channel {name}")]
    RateLimited { name: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
