mod contribution_sweep;

pub use self::contribution_sweep::{sweep_pending_words, SweepOutcome};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::{env_bool, env_string};
use crate::services::contribution::{ContributionError, ContributionTrigger};
use crate::services::learning::{LearningError, LearningService};

const DEFAULT_SWEEP_SCHEDULE: &str = "0 */15 * * * *";

static WORKER_LEADER: AtomicBool = AtomicBool::new(false);

pub fn is_worker_leader() -> bool {
    WORKER_LEADER.load(Ordering::Relaxed)
}

fn set_worker_leader(val: bool) {
    WORKER_LEADER.store(val, Ordering::Relaxed);
}

pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    learning: Arc<LearningService>,
    trigger: Arc<ContributionTrigger>,
}

impl WorkerManager {
    pub async fn new(
        learning: Arc<LearningService>,
        trigger: Arc<ContributionTrigger>,
    ) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            learning,
            trigger,
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        if !env_bool("WORKER_LEADER").unwrap_or(false) {
            info!("WORKER_LEADER not set, skipping worker startup");
            return Ok(());
        }

        set_worker_leader(true);
        info!("Starting workers (leader mode)");

        let scheduler = self.scheduler.lock().await;

        if env_bool("CONTRIBUTION_SWEEP_ENABLED").unwrap_or(true) {
            let schedule = env_string("CONTRIBUTION_SWEEP_SCHEDULE")
                .unwrap_or_else(|| DEFAULT_SWEEP_SCHEDULE.to_string());
            let learning = Arc::clone(&self.learning);
            let trigger = Arc::clone(&self.trigger);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(&schedule, move |_uuid, _lock| {
                let learning = Arc::clone(&learning);
                let trigger = Arc::clone(&trigger);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    // Cancelling the sweep mid-run still releases the contribution guard.
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = sweep_pending_words(&learning, &trigger) => {
                            match result {
                                Ok(outcome) => info!(?outcome, "Contribution sweep finished"),
                                Err(e) => error!(error = %e, "Contribution sweep error"),
                            }
                        }
                    }
                })
            })?;
            scheduler.add(job).await?;
            info!(schedule = %schedule, "Contribution sweep scheduled");
        }

        scheduler.start().await?;
        info!("All workers started");

        Ok(())
    }

    pub async fn stop(&self) {
        if !is_worker_leader() {
            return;
        }

        info!("Stopping workers...");
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Error shutting down scheduler");
        }

        set_worker_leader(false);
        info!("Workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Ledger error: {0}")]
    Learning(#[from] LearningError),
    #[error("Contribution error: {0}")]
    Contribution(#[from] ContributionError),
}
