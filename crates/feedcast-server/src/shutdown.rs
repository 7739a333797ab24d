//! Ordered graceful shutdown via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared shutdown signal plus helpers for stopping tasks in order.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve on Ctrl-C, SIGTERM, or an explicit [`Self::shutdown`], and
    /// cancel the token.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    let _ = sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("received ctrl-c"),
            () = terminate => info!("received SIGTERM"),
            () = self.token.cancelled() => {}
        }
        self.shutdown();
    }

    /// Wait up to `timeout` for one shutdown phase to finish.
    ///
    /// A phase that overruns is aborted. Returns `true` if it finished on its
    /// own.
    pub async fn join_phase(&self, phase: &str, mut handle: JoinHandle<()>, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!(phase, "shutdown phase complete");
                true
            }
            Ok(Err(e)) => {
                warn!(phase, error = %e, "shutdown phase task failed");
                false
            }
            Err(_) => {
                warn!(phase, ?timeout, "shutdown phase timed out, aborting");
                handle.abort();
                false
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(t1.is_cancelled() && t2.is_cancelled());
    }

    #[tokio::test]
    async fn wait_for_signal_returns_on_explicit_shutdown() {
        let coord = std::sync::Arc::new(ShutdownCoordinator::new());
        let waiter = {
            let coord = std::sync::Arc::clone(&coord);
            tokio::spawn(async move { coord.wait_for_signal().await })
        };
        coord.shutdown();
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn join_phase_completes() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move { token.cancelled().await });
        coord.shutdown();
        assert!(coord.join_phase("test", handle, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn join_phase_aborts_on_timeout() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(std::future::pending::<()>());
        assert!(!coord.join_phase("stuck", handle, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn join_phase_reports_panics() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async { panic!("boom") });
        assert!(!coord.join_phase("panicky", handle, Duration::from_secs(2)).await);
    }
}
