//! Gateway task. Connects a [`Channel`], announces readiness, then polls
//! for chat commands until shutdown.
//!
//! Runs concurrently with the scheduler; the only state it shares is the
//! readiness flag (written here, read by the scheduler) and the shutdown
//! signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::channels::channel::Channel;
use crate::channels::commands::CommandTable;
use crate::worker::shutdown::{ShutdownHandle, wait_for_shutdown};

/// Delay between connection attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Spawn the gateway task.
///
/// `ready` flips to `true` once `connect()` succeeds. The task exits when
/// `shutdown` is triggered, either externally or by a command handler.
pub fn spawn_gateway(
    channel: Arc<dyn Channel>,
    commands: CommandTable,
    ready: watch::Sender<bool>,
    shutdown: ShutdownHandle,
    command_poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stop = shutdown.subscribe();

        info!(channel = channel.name(), "Starting gateway connection");
        loop {
            tokio::select! {
                result = channel.connect() => match result {
                    Ok(()) => break,
                    Err(e) => {
                        warn!(channel = channel.name(), error = %e, "Gateway connection failed, retrying");
                    }
                },
                () = wait_for_shutdown(&mut stop) => {
                    info!("Gateway shutting down before ready");
                    return;
                }
            }

            tokio::select! {
                () = tokio::time::sleep(CONNECT_RETRY_DELAY) => {}
                () = wait_for_shutdown(&mut stop) => return,
            }
        }

        ready.send_replace(true);
        info!(channel = channel.name(), commands = ?commands.names(), "Gateway ready");

        let mut tick = tokio::time::interval(command_poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                () = wait_for_shutdown(&mut stop) => break,
            }

            match channel.poll_commands().await {
                Ok(incoming) => {
                    for command in &incoming {
                        commands.dispatch(command, channel.as_ref()).await;
                    }
                }
                Err(e) => warn!(channel = channel.name(), error = %e, "Command poll failed"),
            }
        }

        if let Err(e) = channel.shutdown().await {
            warn!(error = %e, "Gateway shutdown failed");
        }
        info!("Gateway stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::channels::channel::{IncomingCommand, NotificationPayload};
    use crate::channels::commands::{DIE_REPLY, PING_REPLY};
    use crate::error::ChannelError;

    /// Fails `connect` a number of times, then serves queued commands once.
    struct ScriptedChannel {
        connect_failures: AtomicUsize,
        pending: Mutex<Vec<IncomingCommand>>,
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        fn new(connect_failures: usize, commands: &[&str]) -> Self {
            Self {
                connect_failures: AtomicUsize::new(connect_failures),
                pending: Mutex::new(
                    commands
                        .iter()
                        .enumerate()
                        .filter_map(|(i, c)| IncomingCommand::parse(i.to_string(), "tester", c, "/"))
                        .collect(),
                ),
                replies: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn connect(&self) -> Result<(), ChannelError> {
            let left = self.connect_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.connect_failures.store(left - 1, Ordering::SeqCst);
                return Err(ChannelError::StartupFailed {
                    name: "scripted".into(),
                    reason: "not yet".into(),
                });
            }
            Ok(())
        }
        async fn send_notification(&self, _: &NotificationPayload) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn poll_commands(&self) -> Result<Vec<IncomingCommand>, ChannelError> {
            Ok(std::mem::take(&mut *self.pending.lock().unwrap()))
        }
        async fn reply(&self, _: &IncomingCommand, text: &str) -> Result<(), ChannelError> {
            self.replies.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_after_retries() {
        let channel = Arc::new(ScriptedChannel::new(2, &[]));
        let shutdown = ShutdownHandle::new();
        let (ready_tx, mut ready_rx) = watch::channel(false);

        let handle = spawn_gateway(
            channel,
            CommandTable::standard(shutdown.clone()),
            ready_tx,
            shutdown.clone(),
            Duration::from_millis(100),
        );

        ready_rx.wait_for(|r| *r).await.unwrap();
        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn die_command_stops_gateway() {
        let channel = Arc::new(ScriptedChannel::new(0, &["/ping", "/die"]));
        let shutdown = ShutdownHandle::new();
        let (ready_tx, _ready_rx) = watch::channel(false);

        let handle = spawn_gateway(
            channel.clone(),
            CommandTable::standard(shutdown.clone()),
            ready_tx,
            shutdown.clone(),
            Duration::from_millis(100),
        );

        handle.await.unwrap();
        assert!(shutdown.is_triggered());
        assert_eq!(
            *channel.replies.lock().unwrap(),
            vec![PING_REPLY.to_string(), DIE_REPLY.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_ready_exits() {
        let channel = Arc::new(ScriptedChannel::new(usize::MAX, &[]));
        let shutdown = ShutdownHandle::new();
        let (ready_tx, ready_rx) = watch::channel(false);

        let handle = spawn_gateway(
            channel,
            CommandTable::new(),
            ready_tx,
            shutdown.clone(),
            Duration::from_millis(100),
        );

        shutdown.trigger();
        handle.await.unwrap();
        assert!(!*ready_rx.borrow());
    }
}
