//! Background task management
//!
//! Registers, starts and shuts down the engine's background tasks.
//!
//! # Task kinds
//!
//! - [`TaskKind::Worker`] - long-lived background worker
//! - [`TaskKind::Periodic`] - timer-driven task

use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::FlipEngine;
use crate::epoch::{EpochObserver, EpochWatcher};
use crate::reconcile::ReconcileWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Long-lived background worker
    Worker,
    /// Timer-driven task
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Worker => write!(f, "Worker"),
            TaskKind::Periodic => write!(f, "Periodic"),
        }
    }
}

struct RegisteredTask {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// Background task registry
///
/// # Example
///
/// ```ignore
/// let mut tasks = BackgroundTasks::new();
/// tasks.spawn("reconcile_worker", TaskKind::Worker, async move {
///     worker.run().await;
/// });
/// // ... later
/// tasks.shutdown().await;
/// ```
pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token handed to tasks so they can observe the shutdown signal.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register and start a background task.
    ///
    /// The future is wrapped to catch panics; an abnormal exit is logged
    /// instead of tearing down the process.
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let wrapped_future = async move {
            let result: Result<(), Box<dyn std::any::Any + Send>> =
                AssertUnwindSafe(future).catch_unwind().await;
            match result {
                Ok(()) => {}
                Err(panic_info) => {
                    let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    tracing::error!(task = %name, kind = %kind, panic = %panic_msg, "Background task panicked");
                }
            }
        };

        let handle = tokio::spawn(wrapped_future);
        tracing::debug!(task = %name, kind = %kind, "Registered background task");
        self.tasks.push(RegisteredTask { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Graceful shutdown: cancel every task and await completion.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down {} background tasks...", self.tasks.len());

        self.shutdown.cancel();

        for task in self.tasks {
            match task.handle.await {
                Ok(()) => tracing::debug!(task = %task.name, "Task completed"),
                Err(e) if e.is_cancelled() => tracing::debug!(task = %task.name, "Task cancelled"),
                Err(e) => tracing::error!(task = %task.name, error = ?e, "Task panicked"),
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the engine's standard background tasks: the reconcile worker and
/// the epoch watcher. Call `shutdown()` on the returned registry to stop
/// them.
pub fn start_background_tasks(
    engine: Arc<FlipEngine>,
    observer: Arc<dyn EpochObserver>,
) -> BackgroundTasks {
    let mut tasks = BackgroundTasks::new();

    let worker = ReconcileWorker::new(engine.clone(), tasks.shutdown_token());
    tasks.spawn("reconcile_worker", TaskKind::Worker, async move {
        worker.run().await;
    });

    let watcher = EpochWatcher::new(engine, observer, tasks.shutdown_token());
    tasks.spawn("epoch_watcher", TaskKind::Periodic, async move {
        watcher.run().await;
    });

    tasks
}
