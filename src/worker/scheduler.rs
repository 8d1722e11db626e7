//! Relay scheduler. Waits for the gateway, then runs poll cycles on a fixed
//! interval until shutdown.
//!
//! A cycle is strictly sequential: search, fetch, extract, dispatch, one
//! email at a time in mailbox order. The next cycle starts `check_interval`
//! after the previous one finished, never concurrently with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::channels::channel::Channel;
use crate::channels::commands::CommandTable;
use crate::channels::gateway::spawn_gateway;
use crate::config::SchedulerConfig;
use crate::mailbox::poller::{MailboxPoller, PollQuery};
use crate::pipeline::dispatcher::RelayDispatcher;
use crate::pipeline::extractor::extract;
use crate::worker::shutdown::{ShutdownHandle, wait_for_shutdown};
use crate::worker::state::RelayState;

/// How often readiness is re-checked while waiting for the gateway.
pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for the gateway task to wind down before aborting it.
const GATEWAY_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Unseen emails fetched this cycle.
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Drives the relay lifecycle.
pub struct RelayScheduler {
    config: SchedulerConfig,
    poller: MailboxPoller,
    dispatcher: RelayDispatcher,
    shutdown: ShutdownHandle,
    state: watch::Sender<RelayState>,
}

impl RelayScheduler {
    pub fn new(
        config: SchedulerConfig,
        poller: MailboxPoller,
        dispatcher: RelayDispatcher,
        shutdown: ShutdownHandle,
    ) -> Self {
        let (state, _rx) = watch::channel(RelayState::Idle);
        Self {
            config,
            poller,
            dispatcher,
            shutdown,
            state,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    pub fn poller(&self) -> &MailboxPoller {
        &self.poller
    }

    fn transition(&self, target: RelayState) {
        let current = self.state();
        if !current.can_transition_to(target) {
            warn!(from = %current, to = %target, "Ignoring invalid state transition");
            return;
        }
        self.state.send_replace(target);
        info!(from = %current, to = %target, "Relay state changed");
    }

    /// Run one poll cycle: fetch unseen emails, then extract and dispatch
    /// each one in order.
    ///
    /// A failed dispatch is counted and logged; the rest of the batch still
    /// goes out.
    pub async fn run_cycle(&mut self) -> CycleReport {
        info!("Checking for new inReach messages");

        let query = PollQuery::new(
            &self.config.senders,
            self.config.subject_filter.as_deref(),
            self.config.lookback_days,
        );
        let emails = self.poller.poll(&query).await;

        let mut report = CycleReport {
            fetched: emails.len(),
            ..CycleReport::default()
        };
        if emails.is_empty() {
            info!("No new messages");
            return report;
        }

        for email in &emails {
            let notification = extract(&email.body);
            info!(
                id = %email.id,
                link = %notification.tracking_link,
                has_location = notification.coordinates.is_some(),
                "Parsed inReach message"
            );

            if self.dispatcher.dispatch(&notification).await {
                report.delivered += 1;
            } else {
                error!(id = %email.id, "Failed to relay message");
                report.failed += 1;
            }
        }

        info!(
            fetched = report.fetched,
            delivered = report.delivered,
            failed = report.failed,
            "Poll cycle complete"
        );
        report
    }

    /// Start the gateway on `channel` and run until shutdown.
    ///
    /// No cycle starts before the gateway reports ready. The first cycle
    /// runs immediately once it does; after that, one cycle per
    /// `check_interval`. Shutdown is checked before every cycle, so a
    /// cycle already in progress is allowed to finish.
    pub async fn run(mut self, channel: Arc<dyn Channel>, commands: CommandTable) {
        let (ready_tx, ready_rx) = watch::channel(false);
        let mut stop = self.shutdown.subscribe();

        self.transition(RelayState::WaitingForGatewayReady);
        let mut gateway = spawn_gateway(
            channel,
            commands,
            ready_tx,
            self.shutdown.clone(),
            self.config.command_poll_interval,
        );

        info!("Waiting for gateway to be ready");
        let ready = loop {
            if *ready_rx.borrow() {
                break true;
            }
            if self.shutdown.is_triggered() {
                break false;
            }
            if gateway.is_finished() {
                error!("Gateway exited before becoming ready");
                break false;
            }
            tokio::select! {
                () = tokio::time::sleep(READY_POLL_INTERVAL) => {}
                () = wait_for_shutdown(&mut stop) => {}
            }
        };

        if ready {
            self.transition(RelayState::Running);
            info!(
                interval_secs = self.config.check_interval.as_secs(),
                senders = ?self.config.senders,
                "Relay running"
            );

            loop {
                if self.shutdown.is_triggered() {
                    break;
                }
                self.run_cycle().await;

                tokio::select! {
                    () = tokio::time::sleep(self.config.check_interval) => {}
                    () = wait_for_shutdown(&mut stop) => break,
                }
            }
        }

        self.transition(RelayState::Stopping);
        // The gateway only exits on shutdown.
        self.shutdown.trigger();
        match tokio::time::timeout(GATEWAY_STOP_TIMEOUT, &mut gateway).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Gateway task failed"),
            Err(_) => {
                warn!("Gateway did not stop in time, aborting");
                gateway.abort();
            }
        }

        self.transition(RelayState::Stopped);
        info!(processed = self.poller.ledger().len(), "Relay stopped");
    }
}
