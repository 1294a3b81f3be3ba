//! # Refund Reconciler
//!
//! Background worker that settles a send once its dispatch has had time to
//! finish. Every scheduled job waits `reconcile_delay`, then refunds the
//! parts of the job's batches that no gateway delivered.
//!
//! ```text
//!   SmsService ── schedule(user, batches) ──► mpsc ──► Reconciler::run
//!                                                         │ spawn per job
//!                                                         ▼
//!                                              sleep(reconcile_delay)
//!                                              failed_parts(batch)…
//!                                              refund_balance(user, Σ)
//! ```
//!
//! Jobs already waiting when shutdown arrives still run to completion, so
//! a stopped daemon does not keep charges for undelivered messages.

use std::sync::Arc;
use std::time::Duration;

use bazaar_db::Database;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::{SmsError, SmsResult};
use crate::service::ServiceStats;

/// Batches of one user to settle together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileJob {
    pub user_id: String,
    pub batch_ids: Vec<String>,
}

/// Handle for queueing jobs and stopping the worker.
#[derive(Clone)]
pub struct ReconcilerHandle {
    job_tx: mpsc::Sender<ReconcileJob>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ReconcilerHandle {
    pub async fn schedule(&self, user_id: &str, batch_ids: Vec<String>) -> SmsResult<()> {
        self.job_tx
            .send(ReconcileJob {
                user_id: user_id.to_string(),
                batch_ids,
            })
            .await
            .map_err(|_| SmsError::ShuttingDown)
    }

    pub async fn shutdown(&self) -> SmsResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SmsError::ChannelError("Reconciler shutdown channel closed".into()))
    }
}

pub struct Reconciler {
    db: Database,
    delay: Duration,
    stats: Arc<RwLock<ServiceStats>>,
    job_rx: mpsc::Receiver<ReconcileJob>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Reconciler {
    pub fn new(db: Database, delay: Duration, stats: Arc<RwLock<ServiceStats>>) -> (Self, ReconcilerHandle) {
        let (job_tx, job_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let reconciler = Reconciler {
            db,
            delay,
            stats,
            job_rx,
            shutdown_rx,
        };
        (reconciler, ReconcilerHandle { job_tx, shutdown_tx })
    }

    /// Runs until shutdown, then waits for the jobs already queued.
    pub async fn run(mut self) {
        info!(delay_secs = self.delay.as_secs(), "Reconciler starting");
        let mut pending = JoinSet::new();

        loop {
            tokio::select! {
                Some(job) = self.job_rx.recv() => {
                    let db = self.db.clone();
                    let stats = self.stats.clone();
                    let delay = self.delay;
                    pending.spawn(async move {
                        tokio::time::sleep(delay).await;
                        settle(&db, &stats, &job).await;
                    });
                }

                // reap finished jobs so the set does not grow
                Some(_) = pending.join_next(), if !pending.is_empty() => {}

                _ = self.shutdown_rx.recv() => {
                    info!(waiting = pending.len(), "Reconciler shutting down");
                    break;
                }
            }
        }

        self.job_rx.close();
        while let Ok(job) = self.job_rx.try_recv() {
            settle(&self.db, &self.stats, &job).await;
        }
        while pending.join_next().await.is_some() {}

        info!("Reconciler stopped");
    }
}

async fn settle(db: &Database, stats: &RwLock<ServiceStats>, job: &ReconcileJob) {
    match reconcile(db, job).await {
        Ok(parts) => stats.write().await.refunded_parts += parts,
        Err(e) => error!(?e, user = %job.user_id, "Failed to reconcile batch"),
    }
}

/// Refunds the undelivered parts of a job's batches. Returns the parts
/// refunded.
pub async fn reconcile(db: &Database, job: &ReconcileJob) -> SmsResult<i64> {
    let sms = db.sms();
    let mut parts = 0;
    for batch_id in &job.batch_ids {
        parts += sms.failed_parts(batch_id).await?;
    }

    if parts == 0 {
        debug!(user = %job.user_id, batches = job.batch_ids.len(), "Nothing to refund");
        return Ok(0);
    }

    sms.refund_balance(&job.user_id, parts).await?;
    info!(user = %job.user_id, parts, "Refunded undelivered parts");
    Ok(parts)
}
