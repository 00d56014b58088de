//! Rotation workflow: an explicit, ordered step list with one shared failure
//! handler.
//!
//! # Key invariants
//! - Steps run strictly in order and the first failure ends the cycle.
//! - Every failing step reaches the same handler, which publishes one
//!   notification carrying the failed step, the error and the step's event.
//! - A cycle only touches aliases while holding the `sts-key-rotation` lease;
//!   if another holder has it the cycle is skipped, not queued.
//! - Every attempted cycle, failed or not, records its start time in the
//!   lease store. Scheduled cycles read that marker under the lease, so
//!   replicas sharing the store rotate at most once per interval between
//!   them.
use super::notify::{FAILURE_SUBJECT, FailureNotifier, Notification};
use super::{KeyRotator, RotationStep};
use crate::store::{LeaseStore, StoreError, unix_now};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ROTATION_LEASE: &str = "sts-key-rotation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Succeeded,
    Failed { step: RotationStep, error: String },
    Skipped,
    NotDue,
}

impl WorkflowOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowOutcome::Succeeded => "succeeded",
            WorkflowOutcome::Failed { .. } => "failed",
            WorkflowOutcome::Skipped => "skipped",
            WorkflowOutcome::NotDue => "not_due",
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("rotation store unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct RotationWorkflow {
    rotator: KeyRotator,
    steps: Vec<RotationStep>,
    notifier: Arc<dyn FailureNotifier>,
    leases: Arc<dyn LeaseStore>,
    lease_ttl: Duration,
    holder: String,
}

impl RotationWorkflow {
    pub fn new(
        rotator: KeyRotator,
        leases: Arc<dyn LeaseStore>,
        notifier: Arc<dyn FailureNotifier>,
        lease_ttl: Duration,
    ) -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "sts-issuer".to_string());
        Self {
            rotator,
            steps: RotationStep::CYCLE.to_vec(),
            notifier,
            leases,
            lease_ttl,
            holder: format!("{host}-{:016x}", rand::random::<u64>()),
        }
    }

    pub fn steps(&self) -> &[RotationStep] {
        &self.steps
    }

    pub fn rotator(&self) -> &KeyRotator {
        &self.rotator
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Run one full rotation cycle now.
    ///
    /// Step failures are reported through the notifier and returned as
    /// `WorkflowOutcome::Failed`; only lease-store failures are errors.
    pub async fn run(&self) -> Result<WorkflowOutcome, WorkflowError> {
        self.run_under_lease(None).await
    }

    /// Run one cycle unless any process sharing the lease store started one
    /// less than `interval` ago, in which case the outcome is `NotDue`.
    pub async fn run_if_due(&self, interval: Duration) -> Result<WorkflowOutcome, WorkflowError> {
        self.run_under_lease(Some(interval)).await
    }

    async fn run_under_lease(
        &self,
        min_gap: Option<Duration>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        if !self
            .leases
            .try_acquire(ROTATION_LEASE, &self.holder, self.lease_ttl)
            .await?
        {
            tracing::warn!(lease = ROTATION_LEASE, "rotation already in progress; skipping cycle");
            record_cycle(&WorkflowOutcome::Skipped);
            return Ok(WorkflowOutcome::Skipped);
        }

        let outcome = match self.is_due(min_gap).await {
            Ok(true) => {
                let started_at = unix_now();
                let outcome = self.run_steps().await;
                if let Err(err) = self.leases.record_run(ROTATION_LEASE, started_at).await {
                    tracing::error!(lease = ROTATION_LEASE, error = %err, "failed to record rotation run");
                }
                Ok(outcome)
            }
            Ok(false) => Ok(WorkflowOutcome::NotDue),
            Err(err) => Err(err),
        };

        if let Err(err) = self.leases.release(ROTATION_LEASE, &self.holder).await {
            tracing::warn!(lease = ROTATION_LEASE, error = %err, "failed to release rotation lease");
        }
        let outcome = outcome?;
        record_cycle(&outcome);
        Ok(outcome)
    }

    async fn is_due(&self, min_gap: Option<Duration>) -> Result<bool, StoreError> {
        let Some(min_gap) = min_gap else {
            return Ok(true);
        };
        let due = match self.leases.last_run(ROTATION_LEASE).await? {
            Some(last) => unix_now() >= last.saturating_add(min_gap.as_secs()),
            None => true,
        };
        Ok(due)
    }

    async fn run_steps(&self) -> WorkflowOutcome {
        for step in &self.steps {
            let event = serde_json::json!({ "step": step.as_str() });
            if let Err(err) = self.rotator.run_step(*step).await {
                let error = err.to_string();
                self.on_failure(*step, &error, event).await;
                return WorkflowOutcome::Failed { step: *step, error };
            }
        }
        tracing::info!("rotation cycle completed");
        WorkflowOutcome::Succeeded
    }

    async fn on_failure(&self, step: RotationStep, error: &str, event: serde_json::Value) {
        let notification = Notification {
            subject: FAILURE_SUBJECT.to_string(),
            payload: serde_json::json!({
                "step": step.as_str(),
                "error": error,
                "event": event,
            }),
        };
        if let Err(err) = self.notifier.notify(&notification).await {
            tracing::error!(%step, error = %err, "failed to deliver rotation failure notification");
        }
    }
}

fn record_cycle(outcome: &WorkflowOutcome) {
    metrics::counter!("sts_rotation_cycles_total", "outcome" => outcome.as_str()).increment(1);
}
