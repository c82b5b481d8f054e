//! Cancellation handle and signal wiring
//!
//! A [`Shutdown`] is cloned into every component that can block on I/O.
//! Ctrl-C or SIGTERM flip it once; transfers notice before their next
//! attempt, during retry sleeps and between chunks.

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared cancellation flag
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Request cancellation; later calls are no-ops
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err only when every sender is gone, and we hold one
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

/// Signal handler for graceful shutdown coordination
pub struct SignalHandler {
    shutdown: Shutdown,
}

impl SignalHandler {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }

    /// Setup signal handling for graceful shutdown (CTRL-C, SIGTERM)
    ///
    /// Returns a handle to the background task that monitors for signals.
    pub fn setup(&self) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    error!("Failed to install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        error!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, cancelling run"),
                _ = terminate => info!("Received terminate signal, cancelling run"),
                _ = shutdown.cancelled() => return,
            }

            shutdown.trigger();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_trigger_wakes_waiters() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        let waiter = shutdown.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();

        assert!(timeout(Duration::from_millis(200), task).await.is_ok());
        assert!(shutdown.is_triggered());
    }

    /// Waiting after the fact returns immediately
    #[tokio::test]
    async fn test_cancelled_after_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();

        let result = timeout(Duration::from_millis(50), shutdown.cancelled()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_signal_handler_exits_on_manual_shutdown() {
        let shutdown = Shutdown::new();
        let handle = SignalHandler::new(shutdown.clone()).setup();

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();

        assert!(timeout(Duration::from_millis(200), handle).await.is_ok());
    }
}
