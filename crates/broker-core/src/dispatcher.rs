//! Dispatcher (spec §4.1, §4.2, §4.3): the guarded, storage-agnostic
//! front door for job creation, retrieval, cancellation, and claiming. Each
//! method applies the Access Guards before delegating to the `Store`, then
//! translates the store's typed outcome into a `BrokerError` the HTTP layer
//! can render directly — mirroring how the teacher keeps `PgJobStore` a
//! thin SQL layer behind a trait that callers never reach around.

use crate::error::{BrokerError, StoreError};
use crate::guards::{admin_only, owner_access};
use crate::store::{CancelOutcome, ClaimOutcome, Store, UploadOutcome};
use crate::sweeper::SweeperPolicy;
use crate::types::{ArtifactKind, Engine, Image, Job, Key, NewImage, Requirements};
use std::sync::Arc;
use uuid::Uuid;

pub struct Dispatcher<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Dispatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn create_job(
        &self,
        owner: &Key,
        engine_id: Option<Uuid>,
        definition: serde_json::Value,
        requirements: Requirements,
        images: Vec<NewImage>,
    ) -> Result<Job, BrokerError> {
        self.store
            .create_job(owner.id, engine_id, definition, requirements, images)
            .await
            .map_err(BrokerError::from)
    }

    pub async fn get_job(&self, caller: &Key, job_id: Uuid) -> Result<Job, BrokerError> {
        let job = self.store.get_job(job_id).await.map_err(|e| BrokerError::from_store_lookup(e, "job", job_id))?;
        owner_access(&job, caller).into_result("job", job_id)?;
        Ok(job)
    }

    pub async fn list_jobs(&self, caller: &Key) -> Result<Vec<Job>, BrokerError> {
        let owner_filter = if caller.role == crate::types::KeyRole::Admin {
            None
        } else {
            Some(caller.id)
        };
        self.store.list_jobs(owner_filter).await.map_err(BrokerError::from)
    }

    pub async fn cancel_job(&self, caller: &Key, job_id: Uuid) -> Result<(), BrokerError> {
        let job = self.store.get_job(job_id).await.map_err(|e| BrokerError::from_store_lookup(e, "job", job_id))?;
        owner_access(&job, caller).into_result("job", job_id)?;
        match self.store.cancel_job(job_id).await.map_err(BrokerError::from)? {
            CancelOutcome::Cancelled => Ok(()),
            CancelOutcome::AlreadyTerminal => Err(BrokerError::IllegalTransition {
                from: job.state,
                to: "cancelled",
            }),
        }
    }

    /// Record an uploaded artifact. The owner is the only caller allowed to
    /// upload (spec §4.8); the store applies the readiness check and any
    /// NEW -> QUEUED transition atomically with the flag write.
    pub async fn mark_uploaded(
        &self,
        caller: &Key,
        job_id: Uuid,
        image_name: &str,
        kind: ArtifactKind,
        imagehash: Option<String>,
    ) -> Result<UploadOutcome, BrokerError> {
        let job = self.store.get_job(job_id).await.map_err(|e| BrokerError::from_store_lookup(e, "job", job_id))?;
        owner_access(&job, caller).into_result("job", job_id)?;
        self.store
            .mark_image_uploaded(job_id, image_name, kind, imagehash)
            .await
            .map_err(|e| BrokerError::from_store_lookup(e, "image", job_id))
    }

    pub async fn mark_metadata_uploaded(&self, caller: &Key, job_id: Uuid) -> Result<UploadOutcome, BrokerError> {
        let job = self.store.get_job(job_id).await.map_err(|e| BrokerError::from_store_lookup(e, "job", job_id))?;
        owner_access(&job, caller).into_result("job", job_id)?;
        self.store.mark_meta_uploaded(job_id).await.map_err(BrokerError::from)
    }

    /// Claim the next ready job for `caller` (spec §4.3). WORKER role only;
    /// ADMIN may also claim for operational testing.
    pub async fn claim_one(&self, caller: &Key, policy: &SweeperPolicy) -> Result<Option<Job>, BrokerError> {
        if caller.role != crate::types::KeyRole::Worker && caller.role != crate::types::KeyRole::Admin {
            return Err(BrokerError::Forbidden { entity: "job queue" });
        }
        match self.store.claim_one(caller.id, policy).await.map_err(BrokerError::from)? {
            ClaimOutcome::Claimed(job) => Ok(Some(job)),
            ClaimOutcome::QueueEmpty => Ok(None),
        }
    }

    /// Surfaces a store-level unique-constraint hit as `ConflictUniqueness`
    /// instead of an opaque 500 so the caller (the key-hash collision retry
    /// in `broker-server`, or a genuine duplicate label) can branch on it.
    pub async fn create_key(
        &self,
        caller: &Key,
        label: String,
        role: crate::types::KeyRole,
        key_hash: String,
    ) -> Result<Key, BrokerError> {
        admin_only(caller).into_result("key", caller.id)?;
        match self.store.create_key(label, role, key_hash).await {
            Ok(key) => Ok(key),
            Err(StoreError::Conflict { field, value }) => Err(BrokerError::ConflictUniqueness { entity: field, value }),
            Err(other) => Err(BrokerError::from(other)),
        }
    }

    pub async fn update_key(&self, caller: &Key, key_id: Uuid, active: Option<bool>) -> Result<Key, BrokerError> {
        admin_only(caller).into_result("key", caller.id)?;
        self.store
            .update_key(key_id, active)
            .await
            .map_err(|e| BrokerError::from_store_lookup(e, "key", key_id))
    }

    pub async fn list_keys(&self, caller: &Key) -> Result<Vec<Key>, BrokerError> {
        admin_only(caller).into_result("key", caller.id)?;
        self.store.list_keys().await.map_err(BrokerError::from)
    }

    pub async fn get_images(&self, caller: &Key, job_id: Uuid) -> Result<Vec<Image>, BrokerError> {
        let job = self.store.get_job(job_id).await.map_err(|e| BrokerError::from_store_lookup(e, "job", job_id))?;
        owner_access(&job, caller).into_result("job", job_id)?;
        self.store.get_images(job_id).await.map_err(BrokerError::from)
    }

    /// Admin-only: register a processing configuration a job may reference
    /// at creation. Engine *selection* stays out of scope (spec §3); this
    /// just keeps the referenced table manageable.
    pub async fn create_engine(&self, caller: &Key, name: String, version: String) -> Result<Engine, BrokerError> {
        admin_only(caller).into_result("engine", caller.id)?;
        match self.store.create_engine(name, version).await {
            Ok(engine) => Ok(engine),
            Err(StoreError::Conflict { field, value }) => Err(BrokerError::ConflictUniqueness { entity: field, value }),
            Err(other) => Err(BrokerError::from(other)),
        }
    }

    pub async fn list_engines(&self, caller: &Key) -> Result<Vec<Engine>, BrokerError> {
        admin_only(caller).into_result("engine", caller.id)?;
        self.store.list_engines().await.map_err(BrokerError::from)
    }

    pub async fn get_engine(&self, caller: &Key, engine_id: Uuid) -> Result<Engine, BrokerError> {
        admin_only(caller).into_result("engine", caller.id)?;
        self.store
            .get_engine(engine_id)
            .await
            .map_err(|e| BrokerError::from_store_lookup(e, "engine", engine_id))
    }

    /// Covers both `PATCH` (explicit `active`) and `DELETE` (soft-delete by
    /// forcing `active = false`) — engines, like keys, are never hard-deleted.
    pub async fn update_engine(&self, caller: &Key, engine_id: Uuid, active: Option<bool>) -> Result<Engine, BrokerError> {
        admin_only(caller).into_result("engine", caller.id)?;
        self.store
            .update_engine(engine_id, active)
            .await
            .map_err(|e| BrokerError::from_store_lookup(e, "engine", engine_id))
    }
}
