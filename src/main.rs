use std::path::Path;
use std::sync::Arc;

use inreach_relay::channels::{Channel, CommandTable, DiscordChannel};
use inreach_relay::config::{LoggingConfig, RelayConfig, TokenConfig};
use inreach_relay::mailbox::{GmailMailbox, MailboxPoller, StaticToken, TokenFile, TokenSource};
use inreach_relay::pipeline::RelayDispatcher;
use inreach_relay::store::ProcessedLedger;
use inreach_relay::worker::{RelayScheduler, ShutdownHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> inreach_relay::error::Result<()> {
    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  export RELAY_SENDERS=no.reply.inreach@garmin.com");
            eprintln!("  export GMAIL_ACCESS_TOKEN=... (or GMAIL_TOKEN_FILE=...)");
            eprintln!("  export DISCORD_BOT_TOKEN=... DISCORD_CHANNEL_ID=...");
            return Err(e.into());
        }
    };

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config.logging);

    eprintln!("📡 inReach Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Senders: {}", config.scheduler.senders.join(", "));
    eprintln!("   Interval: {}s", config.scheduler.check_interval.as_secs());
    eprintln!("   Ledger: {}", config.ledger_path.display());
    eprintln!("   Discord channel: {}\n", config.discord.channel_id);

    // ── Mailbox ──────────────────────────────────────────────────────────
    let tokens: Arc<dyn TokenSource> = match config.gmail.token {
        TokenConfig::Static(token) => Arc::new(StaticToken::new(token)),
        TokenConfig::File(path) => Arc::new(TokenFile::new(path)),
    };
    let mailbox = Arc::new(GmailMailbox::new(tokens, config.gmail.user_id));
    if let Err(e) = mailbox.check_auth().await {
        eprintln!("Error: Gmail authentication failed: {e}");
        return Err(e.into());
    }

    let ledger = ProcessedLedger::load(config.ledger_path.clone()).await?;
    let poller = MailboxPoller::new(mailbox, ledger);

    // ── Discord ──────────────────────────────────────────────────────────
    let discord: Arc<dyn Channel> = Arc::new(DiscordChannel::new(
        config.discord.bot_token,
        config.discord.channel_id,
        config.discord.command_prefix,
    ));
    let dispatcher = RelayDispatcher::new(Arc::clone(&discord), config.embed_title);

    // ── Lifecycle ────────────────────────────────────────────────────────
    let shutdown = ShutdownHandle::new();
    let commands = CommandTable::standard(shutdown.clone());

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            signal_shutdown.trigger();
        }
    });

    let scheduler = RelayScheduler::new(config.scheduler, poller, dispatcher, shutdown);
    scheduler.run(discord, commands).await;

    Ok(())
}

/// Console logging, plus a plain-text file when one is configured.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = logging.level.as_deref().unwrap_or("info");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path.file_name().unwrap_or(path.as_os_str());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}
