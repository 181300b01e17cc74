//! Supervised set of service workers sharing one shutdown signal.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use crate::monitor::{MonitorError, ServiceMonitor};

/// How a worker ended.
#[derive(Debug)]
pub enum WorkerExit {
    /// Returned after the shutdown signal.
    Stopped { service: String },
    /// Gave up on its own, e.g. an unusable target.
    Failed { service: String, error: MonitorError },
    /// Panicked or was aborted.
    Crashed { service: String, reason: String },
}

impl WorkerExit {
    pub fn service(&self) -> &str {
        match self {
            WorkerExit::Stopped { service }
            | WorkerExit::Failed { service, .. }
            | WorkerExit::Crashed { service, .. } => service,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, WorkerExit::Stopped { .. })
    }
}

/// Runs one task per [`ServiceMonitor`].
///
/// Dropping the supervisor aborts every worker; call [`Supervisor::shutdown`]
/// to let them finish their current step first.
pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    workers: JoinSet<Result<(), MonitorError>>,
    names: HashMap<Id, String>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            workers: JoinSet::new(),
            names: HashMap::new(),
        }
    }

    /// Start `monitor` on its own task.
    pub fn spawn(&mut self, monitor: ServiceMonitor) {
        let service = monitor.name().to_string();
        let shutdown = self.shutdown_tx.subscribe();
        let handle = self.workers.spawn(monitor.run(shutdown));
        debug!(%service, "worker spawned");
        self.names.insert(handle.id(), service);
    }

    /// Number of workers that have not been reaped yet.
    pub fn active(&self) -> usize {
        self.workers.len()
    }

    /// Wait for the next worker to end. `None` when none are left.
    ///
    /// Cancel safe: dropping the future loses no exit.
    pub async fn next_exit(&mut self) -> Option<WorkerExit> {
        let joined = self.workers.join_next_with_id().await?;
        let exit = match joined {
            Ok((id, Ok(()))) => WorkerExit::Stopped {
                service: self.take_name(id),
            },
            Ok((id, Err(error))) => WorkerExit::Failed {
                service: self.take_name(id),
                error,
            },
            Err(e) => WorkerExit::Crashed {
                service: self.take_name(e.id()),
                reason: e.to_string(),
            },
        };
        match &exit {
            WorkerExit::Stopped { service } => debug!(%service, "worker stopped"),
            WorkerExit::Failed { service, error } => {
                error!(%service, error = %error, "worker failed")
            }
            WorkerExit::Crashed { service, reason } => {
                error!(%service, %reason, "worker crashed")
            }
        }
        Some(exit)
    }

    /// Reap workers until none are left.
    pub async fn wait_all(&mut self) -> Vec<WorkerExit> {
        let mut exits = Vec::new();
        while let Some(exit) = self.next_exit().await {
            exits.push(exit);
        }
        exits
    }

    /// Signal every worker to stop and wait up to `grace` for them.
    /// Stragglers are aborted and reported as crashed.
    pub async fn shutdown(mut self, grace: Duration) -> Vec<WorkerExit> {
        info!(workers = self.workers.len(), "shutting down workers");
        self.shutdown_tx.send_replace(true);

        let mut exits = Vec::new();
        let drained = tokio::time::timeout(grace, async {
            while let Some(exit) = self.next_exit().await {
                exits.push(exit);
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = self.workers.len(), "grace period elapsed, aborting workers");
            self.workers.abort_all();
            exits.extend(self.wait_all().await);
        }
        exits
    }

    fn take_name(&mut self, id: Id) -> String {
        self.names
            .remove(&id)
            .unwrap_or_else(|| format!("task-{id}"))
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
