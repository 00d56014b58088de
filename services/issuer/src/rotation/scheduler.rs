//! Time-based rotation trigger and one-time ring bootstrap.
use super::workflow::{RotationWorkflow, WorkflowError, WorkflowOutcome};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Upper bound on how often the scheduler asks whether a rotation is due.
pub const ROTATION_CHECK_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Rotate whenever the last recorded cycle is at least `interval` old.
///
/// The schedule lives in the lease store, not in this task: restarts do not
/// reset it and replicas sharing the store rotate once per interval between
/// them. Cycle failures are already reported by the workflow; the task keeps
/// checking regardless.
pub fn spawn_rotation_scheduler(workflow: RotationWorkflow, interval: Duration) -> JoinHandle<()> {
    let period = interval.min(ROTATION_CHECK_PERIOD);
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match workflow.run_if_due(interval).await {
                Ok(WorkflowOutcome::NotDue) => tracing::debug!("scheduled rotation not due"),
                Ok(outcome) => tracing::info!(outcome = outcome.as_str(), "scheduled rotation finished"),
                Err(err) => tracing::error!(error = %err, "scheduled rotation could not start"),
            }
        }
    })
}

/// Bootstrap the ring so that CURRENT and PENDING are both bound, running at
/// most two cycles back to back.
///
/// A ring that already has both bound is left untouched, so re-running this
/// on every process start never retires a key that signed live tokens. A ring
/// left half-built by an interrupted bootstrap gets only the missing cycle.
pub async fn populate_keys(workflow: &RotationWorkflow) -> Result<Vec<WorkflowOutcome>, WorkflowError> {
    let mut outcomes = Vec::with_capacity(2);
    for round in 1..=2 {
        let ring = workflow.rotator().ring().await?;
        if ring.current.is_some() && ring.pending.is_some() {
            tracing::info!(round, "signing keys already populated");
            break;
        }
        let outcome = workflow.run().await?;
        tracing::info!(round, outcome = outcome.as_str(), "initial key population");
        let done = outcome != WorkflowOutcome::Succeeded;
        outcomes.push(outcome);
        if done {
            break;
        }
    }
    Ok(outcomes)
}
