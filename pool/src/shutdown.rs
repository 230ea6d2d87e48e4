//! Process-wide shutdown fan-out.
//!
//! The supervisor and the admin server each hold a [`ShutdownSignal`] and
//! `select!` on it beside their own work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Clone)]
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
            triggered: Arc::clone(&self.triggered),
        }
    }

    /// Trigger shutdown programmatically. Later calls are no-ops.
    pub fn shutdown(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            // No subscribers left is fine.
            let _ = self.tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait for SIGINT or SIGTERM, then trigger shutdown.
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                res = signal::ctrl_c() => { res?; info!("received SIGINT, shutting down"); }
                _ = terminate.recv() => { info!("received SIGTERM, shutting down"); }
            }
        }
        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("received Ctrl-C, shutting down");
        }

        self.shutdown();
        Ok(())
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to each subsystem.
pub struct ShutdownSignal {
    rx: broadcast::Receiver<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered, including before this
    /// signal was created or while nobody was listening.
    pub async fn recv(&mut self) {
        if self.triggered.load(Ordering::SeqCst) {
            return;
        }
        // Closed or lagged both mean the controller is done with us.
        let _ = self.rx.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn programmatic_shutdown_notifies_every_subscriber() {
        let controller = ShutdownController::new();
        let mut a = controller.subscribe();
        let mut b = controller.subscribe();
        controller.shutdown();
        a.recv().await;
        b.recv().await;
        assert!(controller.is_triggered());
    }

    #[tokio::test]
    async fn late_subscriber_still_sees_shutdown() {
        let controller = ShutdownController::new();
        controller.shutdown();
        controller.shutdown();
        let mut late = controller.subscribe();
        tokio::time::timeout(Duration::from_secs(1), late.recv())
            .await
            .expect("late subscriber should return at once");
    }
}
