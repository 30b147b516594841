//! Periodic safety net for the contribution trigger: request-path triggers
//! are fire-and-forget, so a failed or skipped run is retried here.

use tracing::debug;

use super::WorkerError;
use crate::services::contribution::{ContributionError, ContributionTrigger};
use crate::services::learning::LearningService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    NotConfigured,
    BelowThreshold { pending: usize },
    Busy,
    Contributed { pr_number: Option<u64>, words: usize },
}

pub async fn sweep_pending_words(
    learning: &LearningService,
    trigger: &ContributionTrigger,
) -> Result<SweepOutcome, WorkerError> {
    if !trigger.is_configured() {
        return Ok(SweepOutcome::NotConfigured);
    }

    let config = learning.config().await;
    let stats = learning.stats().await?;
    if !config.should_trigger_pr(stats.pending_count, stats.is_processing) {
        debug!(pending = stats.pending_count, processing = stats.is_processing, "sweep skipped");
        return Ok(if stats.is_processing {
            SweepOutcome::Busy
        } else {
            SweepOutcome::BelowThreshold { pending: stats.pending_count }
        });
    }

    match trigger.run().await {
        Ok(result) => Ok(SweepOutcome::Contributed {
            pr_number: result.pr_number,
            words: result.words.len(),
        }),
        Err(ContributionError::InProgress) => Ok(SweepOutcome::Busy),
        Err(err) => Err(err.into()),
    }
}
