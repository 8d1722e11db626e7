//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::mailbox::poller::DEFAULT_LOOKBACK_DAYS;
use crate::pipeline::dispatcher::DEFAULT_TITLE;

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
const DEFAULT_COMMAND_POLL_SECS: u64 = 5;
const DEFAULT_LEDGER_PATH: &str = "./data/processed_emails.txt";

/// Where the mailbox access token comes from.
#[derive(Debug)]
pub enum TokenConfig {
    /// `GMAIL_ACCESS_TOKEN`.
    Static(SecretString),
    /// `GMAIL_TOKEN_FILE`, re-read on every request.
    File(PathBuf),
}

/// Gmail settings.
#[derive(Debug)]
pub struct GmailConfig {
    pub token: TokenConfig,
    /// Mailbox owner; `me` for the authenticated user.
    pub user_id: String,
}

/// Discord settings.
#[derive(Debug)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
    pub channel_id: u64,
    pub command_prefix: String,
}

/// Poll cycle settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Allowed senders, queried in this order.
    pub senders: Vec<String>,
    pub subject_filter: Option<String>,
    /// Wait between the end of one cycle and the start of the next.
    pub check_interval: Duration,
    pub lookback_days: u64,
    /// How often the gateway polls for chat commands.
    pub command_poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            senders: Vec::new(),
            subject_filter: None,
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            command_poll_interval: Duration::from_secs(DEFAULT_COMMAND_POLL_SECS),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: Option<String>,
    /// Also write logs to this file.
    pub file: Option<PathBuf>,
}

/// Relay configuration.
#[derive(Debug)]
pub struct RelayConfig {
    pub scheduler: SchedulerConfig,
    pub gmail: GmailConfig,
    pub discord: DiscordConfig,
    pub ledger_path: PathBuf,
    pub embed_title: String,
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let senders: Vec<String> = require("RELAY_SENDERS")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if senders.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_SENDERS".into(),
                message: "at least one sender is required".into(),
            });
        }

        let check_interval_secs = parse_or(&get, "RELAY_CHECK_INTERVAL_SECS", DEFAULT_CHECK_INTERVAL_SECS)?;
        if check_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_CHECK_INTERVAL_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }
        let lookback_days = parse_or(&get, "RELAY_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS)?;
        if lookback_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_LOOKBACK_DAYS".into(),
                message: "must be at least one day".into(),
            });
        }
        let command_poll_secs = parse_or(&get, "DISCORD_COMMAND_POLL_SECS", DEFAULT_COMMAND_POLL_SECS)?.max(1);

        let scheduler = SchedulerConfig {
            senders,
            subject_filter: get("RELAY_SUBJECT"),
            check_interval: Duration::from_secs(check_interval_secs),
            lookback_days,
            command_poll_interval: Duration::from_secs(command_poll_secs),
        };

        let token = match (get("GMAIL_ACCESS_TOKEN"), get("GMAIL_TOKEN_FILE")) {
            (Some(token), _) => TokenConfig::Static(SecretString::from(token)),
            (None, Some(path)) => TokenConfig::File(PathBuf::from(path)),
            (None, None) => {
                return Err(ConfigError::MissingRequired {
                    key: "GMAIL_ACCESS_TOKEN".into(),
                    hint: "Set GMAIL_ACCESS_TOKEN or GMAIL_TOKEN_FILE.".into(),
                });
            }
        };
        let gmail = GmailConfig {
            token,
            user_id: get("GMAIL_USER_ID").unwrap_or_else(|| "me".to_string()),
        };

        let channel_id_raw = require("DISCORD_CHANNEL_ID")?;
        let channel_id = channel_id_raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "DISCORD_CHANNEL_ID".into(),
                message: format!("{channel_id_raw:?}: {e}"),
            })?;
        let discord = DiscordConfig {
            bot_token: SecretString::from(require("DISCORD_BOT_TOKEN")?),
            channel_id,
            command_prefix: get("DISCORD_COMMAND_PREFIX").unwrap_or_else(|| "/".to_string()),
        };

        Ok(Self {
            scheduler,
            gmail,
            discord,
            ledger_path: get("RELAY_LEDGER_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH), PathBuf::from),
            embed_title: get("RELAY_EMBED_TITLE").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            logging: LoggingConfig {
                level: get("RELAY_LOG_LEVEL"),
                file: get("RELAY_LOG_FILE").map(PathBuf::from),
            },
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("RELAY_SENDERS", "no.reply.inreach@garmin.com, second@example.com"),
            ("GMAIL_ACCESS_TOKEN", "ya29.token"),
            ("DISCORD_BOT_TOKEN", "bot-token"),
            ("DISCORD_CHANNEL_ID", "123456789012345678"),
        ]
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = RelayConfig::from_lookup(lookup(&minimal())).unwrap();

        assert_eq!(
            config.scheduler.senders,
            vec!["no.reply.inreach@garmin.com", "second@example.com"]
        );
        assert_eq!(config.scheduler.subject_filter, None);
        assert_eq!(config.scheduler.check_interval, Duration::from_secs(60));
        assert_eq!(config.scheduler.lookback_days, 7);
        assert_eq!(config.gmail.user_id, "me");
        assert!(matches!(config.gmail.token, TokenConfig::Static(ref t) if t.expose_secret() == "ya29.token"));
        assert_eq!(config.discord.channel_id, 123_456_789_012_345_678);
        assert_eq!(config.discord.command_prefix, "/");
        assert_eq!(config.ledger_path, PathBuf::from(DEFAULT_LEDGER_PATH));
        assert_eq!(config.embed_title, DEFAULT_TITLE);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "GMAIL_ACCESS_TOKEN");
        pairs.extend([
            ("GMAIL_TOKEN_FILE", "/etc/relay/token.json"),
            ("RELAY_SUBJECT", "inReach message from Sam"),
            ("RELAY_CHECK_INTERVAL_SECS", "300"),
            ("RELAY_LEDGER_PATH", "/var/lib/relay/ids.txt"),
            ("RELAY_LOG_FILE", "bot.log"),
        ]);
        let config = RelayConfig::from_lookup(lookup(&pairs)).unwrap();

        assert!(matches!(config.gmail.token, TokenConfig::File(ref p) if p == &PathBuf::from("/etc/relay/token.json")));
        assert_eq!(
            config.scheduler.subject_filter.as_deref(),
            Some("inReach message from Sam")
        );
        assert_eq!(config.scheduler.check_interval, Duration::from_secs(300));
        assert_eq!(config.ledger_path, PathBuf::from("/var/lib/relay/ids.txt"));
        assert_eq!(config.logging.file, Some(PathBuf::from("bot.log")));
    }

    #[test]
    fn missing_senders_is_fatal() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "RELAY_SENDERS");
        assert!(matches!(
            RelayConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::MissingEnvVar(ref k)) if k == "RELAY_SENDERS"
        ));
    }

    #[test]
    fn missing_mailbox_credentials_is_fatal() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "GMAIL_ACCESS_TOKEN");
        assert!(matches!(
            RelayConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn missing_discord_token_is_fatal() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "DISCORD_BOT_TOKEN");
        assert!(RelayConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn invalid_channel_id_is_rejected() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "DISCORD_CHANNEL_ID");
        pairs.push(("DISCORD_CHANNEL_ID", "general"));
        assert!(matches!(
            RelayConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "DISCORD_CHANNEL_ID"
        ));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut pairs = minimal();
        pairs.push(("RELAY_CHECK_INTERVAL_SECS", "0"));
        assert!(RelayConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn zero_lookback_is_rejected() {
        let mut pairs = minimal();
        pairs.push(("RELAY_LOOKBACK_DAYS", "0"));
        assert!(matches!(
            RelayConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "RELAY_LOOKBACK_DAYS"
        ));
    }

    #[test]
    fn blank_sender_list_is_rejected() {
        let mut pairs = minimal();
        pairs.retain(|(k, _)| *k != "RELAY_SENDERS");
        pairs.push(("RELAY_SENDERS", " , ,"));
        assert!(matches!(
            RelayConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
