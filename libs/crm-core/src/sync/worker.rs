use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::engine::{Reconciler, SyncOutcome};
use crate::{CoreError, CoreResult, TenantId};

const TRIGGER_QUEUE: usize = 16;

#[derive(Debug, Clone)]
enum Trigger {
    All,
    Tenant(TenantId),
}

/// The one background reconciliation task of the process.
pub struct ReconciliationWorker;

impl ReconciliationWorker {
    /// Starts the loop. The first timer tick fires immediately.
    pub fn spawn(reconciler: Arc<Reconciler>, interval: Duration) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE);
        let task = tokio::spawn(run(reconciler, interval, shutdown_rx, trigger_rx));
        WorkerHandle {
            shutdown: shutdown_tx,
            triggers: trigger_tx,
            task,
        }
    }
}

async fn run(
    reconciler: Arc<Reconciler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut triggers: mpsc::Receiver<Trigger>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = interval.as_secs(), "Reconciliation worker started");

    loop {
        // The current run always completes before shutdown is observed.
        let trigger = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            Some(trigger) = triggers.recv() => trigger,
            _ = ticker.tick() => Trigger::All,
        };
        execute(&reconciler, trigger).await;
    }
    info!("Reconciliation worker stopped");
}

async fn execute(reconciler: &Reconciler, trigger: Trigger) {
    match trigger {
        Trigger::All => match reconciler.sync_all_now().await {
            Ok(results) => {
                let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                info!(tenants = results.len(), failed, "Reconciliation pass finished");
            }
            Err(e) => error!(error = %e, "Could not enumerate tenants"),
        },
        Trigger::Tenant(tenant) => match reconciler.sync_now(&tenant).await {
            Ok(SyncOutcome::Skipped { reason }) => info!(%tenant, %reason, "Reconciliation skipped"),
            Ok(SyncOutcome::Finished(_)) => {}
            Err(e) => error!(%tenant, error = %e, "Reconciliation could not run"),
        },
    }
}

pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    triggers: mpsc::Sender<Trigger>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub async fn trigger_all(&self) -> CoreResult<()> {
        self.send(Trigger::All).await
    }

    pub async fn trigger(&self, tenant: TenantId) -> CoreResult<()> {
        self.send(Trigger::Tenant(tenant)).await
    }

    async fn send(&self, trigger: Trigger) -> CoreResult<()> {
        self.triggers
            .send(trigger)
            .await
            .map_err(|_| CoreError::Internal("reconciliation worker is not running".into()))
    }

    /// Signals shutdown and waits for the in-flight run to finish.
    pub async fn stop(self) {
        if self.shutdown.send(true).is_err() {
            warn!("Reconciliation worker already exited");
        }
        if let Err(e) = self.task.await {
            error!(error = %e, "Reconciliation worker panicked");
        }
    }
}
