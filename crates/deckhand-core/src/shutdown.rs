//! Graceful shutdown
//!
//! On Ctrl+C or SIGTERM the server stops accepting requests, cancels the
//! active run and waits (bounded) for it to publish its final events.
//!
//! ```ignore
//! let shutdown = ShutdownController::new(Duration::from_secs(10));
//! let token = shutdown.token();
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(token.cancelled_owned())
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::run::RunOrchestrator;

/// Default time allowed for an active run to unwind
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Cancelling the active run and waiting for it to unwind
    Draining,
    /// Shutdown complete
    Terminated,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Coordinates shutdown of the server and the active run
pub struct ShutdownController {
    cancel_token: CancellationToken,
    phase: watch::Sender<ShutdownPhase>,
    timeout: Duration,
}

impl ShutdownController {
    /// Create a controller that waits up to `timeout` for the active run
    #[must_use]
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            phase: watch::Sender::new(ShutdownPhase::Running),
            timeout,
        })
    }

    /// Token cancelled as soon as shutdown begins
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.phase() != ShutdownPhase::Running
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Stop accepting work, then cancel and drain the active run.
    ///
    /// The first call does the work. Later calls wait until it has finished.
    pub async fn shutdown(&self, orchestrator: &RunOrchestrator) {
        let started = self.phase.send_if_modified(|phase| {
            let first = *phase == ShutdownPhase::Running;
            if first {
                *phase = ShutdownPhase::Draining;
            }
            first
        });
        if !started {
            debug!("Shutdown already initiated, waiting for it to finish");
            let mut phase = self.phase.subscribe();
            // The sender lives in self, so the wait cannot fail
            let _ = phase.wait_for(|p| *p == ShutdownPhase::Terminated).await;
            return;
        }

        info!("Initiating graceful shutdown...");
        self.cancel_token.cancel();
        orchestrator.shutdown(self.timeout).await;
        self.set_phase(ShutdownPhase::Terminated);
        info!("Graceful shutdown complete");
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
