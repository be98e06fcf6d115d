//! Lease Manager (spec §4.4, §4.5): the worker-facing half of the job
//! lifecycle — heartbeat, progress/log updates, voluntary release, and
//! terminal completion/failure reporting. Every method here first confirms
//! the caller currently holds the job's lease (spec §4.7 `worker_access`)
//! before delegating to the store.

use crate::error::{BrokerError, PreconditionCode};
use crate::guards::worker_access;
use crate::store::{CompleteOutcome, FailOutcome, HeartbeatOutcome, ProgressOutcome, ReleaseOutcome, Store};
use crate::types::Key;
use std::sync::Arc;
use uuid::Uuid;

pub struct LeaseManager<S: Store> {
    store: Arc<S>,
}

impl<S: Store> LeaseManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn authorize(&self, caller: &Key, job_id: Uuid) -> Result<(), BrokerError> {
        let job = self.store.get_job(job_id).await.map_err(|e| BrokerError::from_store_lookup(e, "job", job_id))?;
        worker_access(&job, caller).into_result("job", job_id)
    }

    pub async fn heartbeat(&self, caller: &Key, job_id: Uuid) -> Result<(), BrokerError> {
        self.authorize(caller, job_id).await?;
        match self.store.heartbeat(job_id, caller.id).await.map_err(BrokerError::from)? {
            HeartbeatOutcome::Accepted => Ok(()),
            HeartbeatOutcome::Rejected => Err(BrokerError::Precondition(PreconditionCode::NotInProcessing)),
        }
    }

    pub async fn update_progress(
        &self,
        caller: &Key,
        job_id: Uuid,
        progress: Option<f64>,
        log: Option<String>,
        log_user: Option<String>,
    ) -> Result<(), BrokerError> {
        if progress.is_none() && log.is_none() && log_user.is_none() {
            return Err(BrokerError::Precondition(PreconditionCode::NoFields));
        }
        self.authorize(caller, job_id).await?;
        let clamped = progress.map(|p| p.clamp(0.0, 1.0));
        match self
            .store
            .update_progress(job_id, caller.id, clamped, log, log_user)
            .await
            .map_err(BrokerError::from)?
        {
            ProgressOutcome::Accepted => Ok(()),
            ProgressOutcome::Rejected => Err(BrokerError::Precondition(PreconditionCode::NotInProcessing)),
        }
    }

    pub async fn release(&self, caller: &Key, job_id: Uuid) -> Result<(), BrokerError> {
        self.authorize(caller, job_id).await?;
        match self.store.release_lease(job_id, caller.id).await.map_err(BrokerError::from)? {
            ReleaseOutcome::Released => Ok(()),
            ReleaseOutcome::Rejected => Err(BrokerError::Precondition(PreconditionCode::NotInProcessing)),
        }
    }

    /// Idempotent: completing an already-DONE job succeeds silently rather
    /// than erroring, mirroring the original's `JOB_ALREADY_COMPLETED` path.
    /// Returns `true` when the job was already DONE before this call.
    pub async fn complete(&self, caller: &Key, job_id: Uuid) -> Result<bool, BrokerError> {
        self.authorize(caller, job_id).await?;
        match self.store.complete_job(job_id, caller.id).await.map_err(BrokerError::from)? {
            CompleteOutcome::Completed => Ok(false),
            CompleteOutcome::AlreadyCompleted => Ok(true),
            CompleteOutcome::Rejected => Err(BrokerError::Precondition(PreconditionCode::NotInProcessing)),
        }
    }

    /// Reports a worker-side failure, moving the job to ERROR. The Retry
    /// Sweeper decides on the next claim pass whether it's re-queued or
    /// dead-lettered (spec §4.3); already-terminal jobs are accepted
    /// idempotently. Returns `true` when the job was already terminal
    /// before this call.
    pub async fn fail(&self, caller: &Key, job_id: Uuid) -> Result<bool, BrokerError> {
        self.authorize(caller, job_id).await?;
        match self.store.fail_job(job_id, caller.id).await.map_err(BrokerError::from)? {
            FailOutcome::Accepted => Ok(false),
            FailOutcome::AlreadyTerminal => Ok(true),
            FailOutcome::Rejected => Err(BrokerError::Precondition(PreconditionCode::NotInProcessing)),
        }
    }
}
