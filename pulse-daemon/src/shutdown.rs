//! Graceful shutdown handling for pulsed.
//!
//! One OS termination signal fans out to every long-lived task (HTTP
//! server, retention pruner) through a broadcast channel.

use tokio::sync::broadcast;
use tracing::info;

/// Owns the shutdown broadcast channel.
///
/// Construct once in `main`; every task that must stop cleanly holds a
/// receiver from [`subscribe`](Self::subscribe).
pub struct ShutdownManager {
    tx: broadcast::Sender<()>,
}

impl ShutdownManager {
    /// Create the manager and spawn the OS signal listener.
    ///
    /// The listener sends exactly once, when SIGTERM or SIGINT arrives.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        let signal_tx = tx.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
            };

            #[cfg(unix)]
            let terminate = async {
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received SIGINT (Ctrl+C)");
                }
                _ = terminate => {
                    info!("Received SIGTERM");
                }
            }

            let _ = signal_tx.send(());
        });

        Self { tx }
    }

    /// Subscribe a task to the shutdown broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}
