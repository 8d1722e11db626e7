//! Credential handles for the mailbox API.
//!
//! Acquiring and refreshing OAuth tokens happens outside the relay; these
//! sources only hand out the current access token.

use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::MailboxError;

/// Supplies a valid (possibly externally refreshed) access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, MailboxError>;
}

/// A fixed token, e.g. from `GMAIL_ACCESS_TOKEN`.
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<SecretString, MailboxError> {
        Ok(SecretString::from(self.token.expose_secret().to_string()))
    }
}

/// Token JSON written by an external OAuth helper.
#[derive(Deserialize)]
struct TokenFileContents {
    token: Option<String>,
    access_token: Option<String>,
}

impl TokenFileContents {
    fn into_token(self) -> Option<String> {
        self.token
            .filter(|t| !t.is_empty())
            .or(self.access_token)
            .filter(|t| !t.is_empty())
    }
}

/// Re-reads a token file on every call so a refresher can rotate it.
///
/// Accepts `{"token": "..."}` or `{"access_token": "..."}`.
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenSource for TokenFile {
    async fn access_token(&self) -> Result<SecretString, MailboxError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MailboxError::AuthFailed {
                reason: format!("cannot read token file {}: {e}", self.path.display()),
            })?;

        let contents: TokenFileContents =
            serde_json::from_str(&raw).map_err(|e| MailboxError::AuthFailed {
                reason: format!("invalid token file {}: {e}", self.path.display()),
            })?;

        contents
            .into_token()
            .map(SecretString::from)
            .ok_or_else(|| MailboxError::AuthFailed {
                reason: format!("no token in {}", self.path.display()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_returns_value() {
        let source = StaticToken::new(SecretString::from("abc".to_string()));
        assert_eq!(source.access_token().await.unwrap().expose_secret(), "abc");
    }

    #[tokio::test]
    async fn token_file_reads_token_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"token": "ya29.one", "refresh_token": "r"}"#).unwrap();

        let source = TokenFile::new(&path);
        assert_eq!(source.access_token().await.unwrap().expose_secret(), "ya29.one");

        // Rotated by an external refresher.
        std::fs::write(&path, r#"{"access_token": "ya29.two"}"#).unwrap();
        assert_eq!(source.access_token().await.unwrap().expose_secret(), "ya29.two");
    }

    #[tokio::test]
    async fn token_file_with_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"token": "ya29.a", "access_token": "ya29.a"}"#).unwrap();

        let source = TokenFile::new(&path);
        assert_eq!(source.access_token().await.unwrap().expose_secret(), "ya29.a");
    }

    #[tokio::test]
    async fn token_file_missing_is_auth_failure() {
        let source = TokenFile::new("/nonexistent/token.json");
        assert!(matches!(
            source.access_token().await,
            Err(MailboxError::AuthFailed { .. })
        ));
    }

    #[tokio::test]
    async fn token_file_without_token_is_auth_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"refresh_token": "r"}"#).unwrap();

        let source = TokenFile::new(&path);
        assert!(matches!(
            source.access_token().await,
            Err(MailboxError::AuthFailed { .. })
        ));
    }
}
