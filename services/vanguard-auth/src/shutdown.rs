//! Graceful Shutdown Module
//!
//! The server is started with a [`ShutdownSignal`]; when the process receives
//! Ctrl+C or SIGTERM the coordinator fires it, tonic stops accepting
//! connections, and in-flight requests get a bounded drain period.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown coordinator for graceful termination
#[derive(Debug)]
pub struct ShutdownCoordinator {
    shutdown_tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { shutdown_tx }
    }

    /// Gets a shutdown receiver
    #[must_use]
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.shutdown_tx.subscribe(),
        }
    }

    /// Fires every subscribed signal.
    pub fn trigger(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Whether shutdown was triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown signal receiver
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for shutdown signal
    pub async fn recv(mut self) {
        // A dropped coordinator also ends the wait.
        let _ = self.receiver.wait_for(|triggered| *triggered).await;
    }
}

/// Waits for SIGTERM or SIGINT
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}

/// Runs a server until it stops or `signal` fires, then drains it.
///
/// The server future must have been started with a signal from
/// `shutdown_coordinator`. After `signal` fires the server gets
/// `shutdown_timeout` to finish in-flight requests before it is dropped.
///
/// # Errors
///
/// Returns the server's own error if it fails.
pub async fn run_with_graceful_shutdown<F, S, E>(
    server_future: F,
    shutdown_coordinator: ShutdownCoordinator,
    signal: S,
    shutdown_timeout: Duration,
) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
    S: Future<Output = ()>,
    E: std::fmt::Display,
{
    tokio::pin!(server_future);

    tokio::select! {
        result = &mut server_future => {
            match &result {
                Ok(()) => info!("Server stopped normally"),
                Err(e) => error!(error = %e, "Server error"),
            }
            return result;
        }
        () = signal => {
            info!("Shutdown signal received");
        }
    }

    shutdown_coordinator.trigger();

    match tokio::time::timeout(shutdown_timeout, server_future).await {
        Ok(result) => {
            info!("Shutdown complete");
            result
        }
        Err(_) => {
            warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Shutdown timeout reached, abandoning in-flight requests"
            );
            Ok(())
        }
    }
}
