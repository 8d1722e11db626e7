//! Shared types for the relay pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fallback message text when an email body has no free-text section.
pub const NO_MESSAGE_CONTENT: &str = "No message content found";

/// Sentinel tracking link used when no extraction tier finds a link.
pub const NO_TRACKING_LINK: &str = "No tracking link found";

// ── Raw email ───────────────────────────────────────────────────────

/// One fetched mailbox message with headers and plain-text body.
///
/// Header fields are empty strings when the provider omitted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEmail {
    /// Provider-assigned message id.
    pub id: String,
    pub sender: String,
    pub subject: String,
    /// Raw `Date` header, kept for logging.
    pub date_header: String,
    pub received_at: DateTime<Utc>,
    /// Plain-text body (or an explanatory placeholder).
    pub body: String,
}

// ── Parsed notification ─────────────────────────────────────────────

/// Tracking link extracted from an email body.
///
/// `NotFound` renders as the [`NO_TRACKING_LINK`] sentinel; the dispatcher
/// checks for it to decide whether to render the link field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TrackingLink {
    Found(String),
    NotFound,
}

impl TrackingLink {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Found(url) => url,
            Self::NotFound => NO_TRACKING_LINK,
        }
    }

    /// The link URL, unless this is the sentinel.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Found(url) if !url.is_empty() => Some(url),
            _ => None,
        }
    }
}

impl From<String> for TrackingLink {
    fn from(s: String) -> Self {
        if s == NO_TRACKING_LINK {
            Self::NotFound
        } else {
            Self::Found(s)
        }
    }
}

impl From<TrackingLink> for String {
    fn from(link: TrackingLink) -> Self {
        link.as_str().to_string()
    }
}

impl std::fmt::Display for TrackingLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPS position reported by the device.
///
/// Kept as the strings found in the email so decimal precision survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: String,
    pub longitude: String,
}

impl Coordinates {
    pub fn new(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self {
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }
}

/// Structured output of the extraction engine for one email body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedNotification {
    pub message_text: String,
    pub tracking_link: TrackingLink,
    /// Absent (not null) when the body carries no position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}
