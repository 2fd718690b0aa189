//! Reconciliation of partner performer directories into the identity store.

mod engine;
mod worker;

pub use engine::{Reconciler, ReconcilerConfig, SyncOutcome, SyncReport};
pub use worker::{ReconciliationWorker, WorkerHandle};
