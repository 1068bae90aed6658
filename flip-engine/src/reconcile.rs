//! ReconcileWorker — background loop that resolves pending transactions
//!
//! While at least one flip is `Publishing` or `Deleting`, the worker sleeps
//! `reconcile_interval` and runs one reconciliation pass. When nothing is
//! pending it parks on the engine's wakeup and issues no lookups at all;
//! `submit_flip` and `delete_flip` wake it when a new transaction enters
//! flight.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::engine::FlipEngine;

pub struct ReconcileWorker {
    engine: Arc<FlipEngine>,
    shutdown: CancellationToken,
}

impl ReconcileWorker {
    pub fn new(engine: Arc<FlipEngine>, shutdown: CancellationToken) -> Self {
        Self { engine, shutdown }
    }

    /// Run until shutdown.
    ///
    /// 1. Park while no record is pending (no idle polling)
    /// 2. While pending records exist, tick every `reconcile_interval`
    pub async fn run(self) {
        tracing::info!("Reconcile worker started");

        loop {
            if !self.engine.has_pending() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = self.engine.pending_changed.notified() => continue,
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.engine.config().reconcile_interval) => {
                    match self.engine.reconcile_once().await {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!(transitions = n, "Reconcile pass applied transitions"),
                        Err(e) => tracing::error!("Reconcile pass failed: {e}"),
                    }
                }
            }
        }

        tracing::info!("Reconcile worker stopped");
    }
}
