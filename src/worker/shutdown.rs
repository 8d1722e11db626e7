//! Cooperative shutdown signal shared between the gateway and the scheduler.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable trigger for stopping the relay.
///
/// Backed by a `watch` channel: every subscriber observes the flip from
/// `false` to `true`, including ones that subscribe afterwards.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once `rx` observes a shutdown request.
///
/// Also resolves if every handle has been dropped, since nobody can
/// trigger it any more.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
