//! Gmail REST adapter: message search and full-content fetch.
//!
//! Uses the `users.messages.list` / `users.messages.get?format=full`
//! endpoints with a bearer token from a [`TokenSource`]. Message decoding
//! is tolerant: absent headers become empty strings and an undecodable body
//! becomes a placeholder string instead of an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::MailboxError;
use crate::mailbox::Mailbox;
use crate::mailbox::auth::TokenSource;
use crate::pipeline::types::RawEmail;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Placeholder body when a message carries no decodable text.
pub const NO_CONTENT_PLACEHOLDER: &str = "No content found in email";

/// Gmail body data is base64url, with or without padding.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    #[serde(default)]
    email_address: String,
}

/// A message as returned by `users.messages.get?format=full`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    /// Milliseconds since the epoch, as a decimal string.
    pub internal_date: Option<String>,
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    pub data: Option<String>,
}

// ── Decoding ────────────────────────────────────────────────────────

impl GmailMessage {
    /// Header value by case-insensitive name, or empty string.
    pub fn header(&self, name: &str) -> &str {
        self.payload
            .as_ref()
            .and_then(|p| p.headers.iter().find(|h| h.name.eq_ignore_ascii_case(name)))
            .map_or("", |h| h.value.as_str())
    }

    fn received_at(&self) -> DateTime<Utc> {
        self.internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .or_else(|| {
                DateTime::parse_from_rfc2822(self.header("Date"))
                    .ok()
                    .map(|d| d.with_timezone(&Utc))
            })
            .unwrap_or_else(Utc::now)
    }

    /// Convert into the pipeline's [`RawEmail`].
    pub fn into_raw_email(self) -> RawEmail {
        let body = extract_body(self.payload.as_ref());
        RawEmail {
            sender: self.header("From").to_string(),
            subject: self.header("Subject").to_string(),
            date_header: self.header("Date").to_string(),
            received_at: self.received_at(),
            body,
            id: self.id,
        }
    }
}

/// Plain-text body: a `text/plain` part if there is one (depth-first),
/// else the top-level body, else a placeholder.
pub fn extract_body(payload: Option<&MessagePart>) -> String {
    let Some(payload) = payload else {
        return NO_CONTENT_PLACEHOLDER.to_string();
    };

    let data = find_plain_text(payload).or_else(|| part_data(payload));
    match data {
        Some(data) => match decode_body(data) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Error extracting email content");
                format!("Error extracting email content: {e}")
            }
        },
        None => NO_CONTENT_PLACEHOLDER.to_string(),
    }
}

fn part_data(part: &MessagePart) -> Option<&str> {
    part.body.as_ref()?.data.as_deref().filter(|d| !d.is_empty())
}

fn find_plain_text(part: &MessagePart) -> Option<&str> {
    part.parts.iter().find_map(|child| {
        if child.mime_type.eq_ignore_ascii_case("text/plain") {
            part_data(child)
        } else {
            find_plain_text(child)
        }
    })
}

/// Decode base64url body data into UTF-8 text.
pub fn decode_body(data: &str) -> Result<String, MailboxError> {
    let bytes = BODY_ENGINE
        .decode(data.trim())
        .map_err(|e| MailboxError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| MailboxError::Decode(e.to_string()))
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail mailbox for one user.
pub struct GmailMailbox {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    user_id: String,
    base_url: String,
}

impl GmailMailbox {
    pub fn new(tokens: Arc<dyn TokenSource>, user_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            user_id: user_id.into(),
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    /// Point at a different API root (e.g. a local proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/users/{}/messages", self.base_url, self.user_id)
    }

    fn profile_url(&self) -> String {
        format!("{}/users/{}/profile", self.base_url, self.user_id)
    }

    /// Confirm the credentials work by reading the mailbox profile.
    ///
    /// Called once at startup; any error here is fatal.
    pub async fn check_auth(&self) -> Result<String, MailboxError> {
        let request = self.client.get(self.profile_url());
        let profile: Profile = self.get_json("users.getProfile", request).await?;
        info!(email = %profile.email_address, "Authenticated with Gmail");
        Ok(profile.email_address)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, MailboxError> {
        let token = self.tokens.access_token().await?;

        let resp = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| MailboxError::RequestFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(MailboxError::AuthFailed {
                reason: format!("{operation} returned {status}"),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(MailboxError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailboxError::RequestFailed {
                operation: operation.to_string(),
                reason: format!("{status}: {body}"),
            });
        }

        resp.json()
            .await
            .map_err(|e| MailboxError::InvalidResponse(format!("{operation}: {e}")))
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn search(&self, query: &str) -> Result<Vec<String>, MailboxError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(self.messages_url()).query(&[("q", query)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: ListResponse = self.get_json("messages.list", request).await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(query, count = ids.len(), "Mailbox search complete");
        Ok(ids)
    }

    async fn fetch(&self, id: &str) -> Result<RawEmail, MailboxError> {
        let request = self
            .client
            .get(format!("{}/{id}", self.messages_url()))
            .query(&[("format", "full")]);

        let message: GmailMessage = self.get_json("messages.get", request).await?;
        Ok(message.into_raw_email())
    }
}
