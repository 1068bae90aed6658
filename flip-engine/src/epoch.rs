//! Epoch observation and archival trigger
//!
//! The chain runs in epochs; once an epoch's validation ceremony has
//! finished, every local flip is frozen to `Archived`. [`EpochObserver`] is
//! the collaborator that reports the current epoch; [`EpochWatcher`] polls it
//! and triggers archival through the engine's idempotency guard, so the
//! operation runs exactly once per epoch even across restarts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::engine::FlipEngine;
use crate::error::FlipResult;

/// Chain epoch as reported by the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochState {
    pub epoch: u64,
    /// True once the epoch's validation ceremony has completed
    pub validation_done: bool,
}

/// Supplies the current epoch and whether its validation has completed.
#[async_trait]
pub trait EpochObserver: Send + Sync {
    async fn current(&self) -> FlipResult<EpochState>;
}

/// Periodic poller that triggers archival at epoch boundaries.
///
/// Checks once at startup to cover boundaries missed while the process was
/// down, then polls every `epoch_check_interval`.
pub struct EpochWatcher {
    engine: Arc<FlipEngine>,
    observer: Arc<dyn EpochObserver>,
    shutdown: CancellationToken,
}

impl EpochWatcher {
    pub fn new(
        engine: Arc<FlipEngine>,
        observer: Arc<dyn EpochObserver>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            observer,
            shutdown,
        }
    }

    /// Main loop: startup catch-up check, then periodic polling.
    pub async fn run(self) {
        tracing::info!("Epoch watcher started");

        self.check().await;

        let mut interval = tokio::time::interval(self.engine.config().epoch_check_interval);
        interval.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => self.check().await,
            }
        }

        tracing::info!("Epoch watcher stopped");
    }

    async fn check(&self) {
        let state = match self.observer.current().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Epoch observer query failed, retrying next tick: {e}");
                return;
            }
        };

        match self.engine.maybe_archive(&state) {
            Ok(true) => tracing::info!(epoch = state.epoch, "Epoch archival triggered"),
            Ok(false) => {}
            Err(e) => tracing::error!(epoch = state.epoch, "Epoch archival failed: {e}"),
        }
    }
}
