//! The `Store` trait (spec §4.1): the single seam between the pure broker
//! logic and persistence. `broker-postgres::PgStore` is the production
//! implementation; anything satisfying this trait can stand in for tests,
//! mirroring how the teacher's `JobStore` trait lets `PgJobStore` be the
//! only concrete backend while the rest of the crate stays storage-agnostic.

use crate::error::StoreError;
use crate::sweeper::SweeperPolicy;
use crate::types::{ArtifactKind, Engine, Image, Job, Key, KeyRole, NewImage, Requirements};
use async_trait::async_trait;
use uuid::Uuid;

/// Result of an upload that may or may not have flipped a job into QUEUED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Flag recorded; job was not, or not yet, ready.
    Recorded,
    /// Flag recorded; job was already uploaded before (re-upload).
    Reuploaded,
    /// Flag recorded and this upload completed the readiness predicate —
    /// the job moved NEW -> QUEUED atomically with the flag write.
    RecordedAndEnqueued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyTerminal,
}

/// A job claimed off the queue, or none were ready (spec §4.3).
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed(Job),
    QueueEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Accepted,
    /// The job was not PROCESSING under this worker's lease.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed,
    AlreadyCompleted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Job recorded as ERROR; the Retry Sweeper decides on the next claim
    /// pass whether it's re-queued or dead-lettered (spec §4.3, §4.6).
    Accepted,
    AlreadyTerminal,
    Rejected,
}

/// The persistence seam every broker operation is defined against.
///
/// Implementations own atomicity: `mark_image_uploaded`/`mark_meta_uploaded`
/// must apply the readiness check and the NEW -> QUEUED transition (if any)
/// in the same statement or transaction as the flag write (spec §4.2), and
/// `claim_one` must run the retry sweep and the claim in the same
/// transaction (spec §4.3) so a row can't be observed between the two.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_job(
        &self,
        owner_key_id: Uuid,
        engine_id: Option<Uuid>,
        definition: serde_json::Value,
        requirements: Requirements,
        images: Vec<NewImage>,
    ) -> Result<Job, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Job, StoreError>;

    async fn list_jobs(&self, owner_key_id: Option<Uuid>) -> Result<Vec<Job>, StoreError>;

    async fn mark_image_uploaded(
        &self,
        job_id: Uuid,
        image_name: &str,
        kind: ArtifactKind,
        imagehash: Option<String>,
    ) -> Result<UploadOutcome, StoreError>;

    async fn mark_meta_uploaded(&self, job_id: Uuid) -> Result<UploadOutcome, StoreError>;

    async fn cancel_job(&self, job_id: Uuid) -> Result<CancelOutcome, StoreError>;

    async fn claim_one(
        &self,
        worker_key_id: Uuid,
        policy: &SweeperPolicy,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Runs the Retry Sweeper on its own, with no claim attached (spec §5,
    /// §9: an optional periodic background sweeper is allowed to shrink
    /// visible staleness, but correctness never depends on it — every
    /// `claim_one` already runs the same sweep inline).
    async fn sweep(&self, policy: &SweeperPolicy) -> Result<(), StoreError>;

    async fn heartbeat(&self, job_id: Uuid, worker_key_id: Uuid) -> Result<HeartbeatOutcome, StoreError>;

    async fn update_progress(
        &self,
        job_id: Uuid,
        worker_key_id: Uuid,
        progress: Option<f64>,
        log: Option<String>,
        log_user: Option<String>,
    ) -> Result<ProgressOutcome, StoreError>;

    async fn release_lease(&self, job_id: Uuid, worker_key_id: Uuid) -> Result<ReleaseOutcome, StoreError>;

    async fn complete_job(&self, job_id: Uuid, worker_key_id: Uuid) -> Result<CompleteOutcome, StoreError>;

    async fn fail_job(&self, job_id: Uuid, worker_key_id: Uuid) -> Result<FailOutcome, StoreError>;

    async fn get_images(&self, job_id: Uuid) -> Result<Vec<Image>, StoreError>;

    async fn get_image(&self, job_id: Uuid, image_name: &str) -> Result<Image, StoreError>;

    async fn lookup_key_by_hash(&self, key_hash: &str) -> Result<Key, StoreError>;

    /// `key_hash` is the HMAC digest of the raw key; generating and hexing
    /// the raw key itself is an HTTP-boundary concern (it needs the process
    /// secret), not a storage concern.
    async fn create_key(&self, label: String, role: KeyRole, key_hash: String) -> Result<Key, StoreError>;

    async fn key_hash_in_use(&self, key_hash: &str) -> Result<bool, StoreError>;

    async fn touch_key_last_used(&self, key_id: Uuid);

    async fn update_key(&self, key_id: Uuid, active: Option<bool>) -> Result<Key, StoreError>;

    async fn list_keys(&self) -> Result<Vec<Key>, StoreError>;

    async fn create_engine(&self, name: String, version: String) -> Result<Engine, StoreError>;

    async fn get_engine(&self, engine_id: Uuid) -> Result<Engine, StoreError>;

    async fn list_engines(&self) -> Result<Vec<Engine>, StoreError>;

    async fn update_engine(&self, engine_id: Uuid, active: Option<bool>) -> Result<Engine, StoreError>;
}
