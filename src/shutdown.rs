//! Graceful shutdown coordination.
//!
//! Provides a [`ShutdownSignal`] that resolves when a termination signal
//! is received. The intake server drains in-flight requests on shutdown;
//! aggregations still inside their quiet window are dropped rather than
//! flushed early.
//!
//! # Example
//!
//! ```rust,ignore
//! use hookfold::shutdown::ShutdownSignal;
//!
//! #[tokio::main]
//! async fn main() {
//!     let shutdown = ShutdownSignal::new();
//!
//!     axum::serve(listener, app)
//!         .with_graceful_shutdown(async move { shutdown.wait().await })
//!         .await
//!         .unwrap();
//! }
//! ```

use tokio::sync::broadcast;
use tracing::info;

/// A signal for coordinating graceful shutdown across components.
///
/// When a termination signal (SIGTERM, SIGINT) is received, all components
/// holding a clone of this signal will be notified to begin shutdown.
#[derive(Clone)]
pub struct ShutdownSignal {
    /// Broadcast sender for shutdown notification
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Wait for a shutdown signal (SIGTERM or SIGINT).
    ///
    /// This function blocks until a termination signal is received,
    /// then notifies all receivers.
    pub async fn wait(&self) {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
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
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        // Notify all receivers
        let _ = self.sender.send(());
    }

    /// Subscribe to shutdown notifications.
    ///
    /// Returns a receiver that will receive a message when shutdown is triggered.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Trigger shutdown manually (for testing or programmatic shutdown).
    pub fn trigger(&self) {
        info!("Shutdown triggered programmatically");
        let _ = self.sender.send(());
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
