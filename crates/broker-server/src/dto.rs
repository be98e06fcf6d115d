//! Request and response bodies for the HTTP surface (spec §6). Kept separate
//! from `routes.rs` so the wire shapes — and the role-filtered `JobView`
//! projections in particular, grounded on `base_objects.py`'s response-model
//! split — are easy to find in one place.

use broker_core::{Image, Job, Key, KeyRole, NewImage, ProcessingState, Requirements};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ImageSpec {
    pub name: String,
    pub order: i32,
}

impl From<ImageSpec> for NewImage {
    fn from(spec: ImageSpec) -> Self {
        NewImage {
            name: spec.name,
            order: spec.order,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JobCreateRequest {
    pub images: Vec<ImageSpec>,
    #[serde(default)]
    pub alto_required: bool,
    #[serde(default)]
    pub page_required: bool,
    #[serde(default)]
    pub meta_json_required: bool,
    pub engine_id: Option<Uuid>,
    #[serde(default = "default_definition")]
    pub definition: serde_json::Value,
}

fn default_definition() -> serde_json::Value {
    serde_json::json!({})
}

impl JobCreateRequest {
    pub fn requirements(&self) -> Requirements {
        Requirements {
            alto_required: self.alto_required,
            page_required: self.page_required,
            meta_json_required: self.meta_json_required,
        }
    }
}

/// Body of `PATCH /v1/jobs/{id}` — polymorphic across caller role (spec §6).
#[derive(Debug, Default, Deserialize)]
pub struct JobPatchRequest {
    pub state: Option<ProcessingState>,
    pub progress: Option<f64>,
    pub log: Option<String>,
    pub log_user: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    pub order: i32,
    pub imagehash: Option<String>,
    pub image_uploaded: bool,
    pub alto_uploaded: bool,
    pub page_uploaded: bool,
}

impl ImageView {
    fn from_image(image: &Image, with_id: bool) -> Self {
        Self {
            id: with_id.then_some(image.id),
            name: image.name.clone(),
            order: image.order,
            imagehash: image.imagehash.clone(),
            image_uploaded: image.image_uploaded,
            alto_uploaded: image.alto_uploaded,
            page_uploaded: image.page_uploaded,
        }
    }
}

/// The `GET /v1/jobs/{id}` projection (spec §6): non-ADMIN/WORKER callers
/// see no internal log and no image ids, grounded on
/// `general_routes.py::prepare_job_data`'s field-popping for non-privileged
/// roles.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: Uuid,
    pub owner_key_id: Uuid,
    pub worker_key_id: Option<Uuid>,
    pub engine_id: Option<Uuid>,
    pub definition: serde_json::Value,
    pub alto_required: bool,
    pub page_required: bool,
    pub meta_json_required: bool,
    pub meta_json_uploaded: bool,
    pub state: ProcessingState,
    pub progress: f64,
    pub previous_attempts: i32,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub last_change: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    pub log_user: Option<String>,
    pub images: Vec<ImageView>,
}

impl JobView {
    fn new(job: &Job, images: &[Image], privileged: bool) -> Self {
        Self {
            id: job.id,
            owner_key_id: job.owner_key_id,
            worker_key_id: job.worker_key_id,
            engine_id: job.engine_id,
            definition: job.definition.clone(),
            alto_required: job.alto_required,
            page_required: job.page_required,
            meta_json_required: job.meta_json_required,
            meta_json_uploaded: job.meta_json_uploaded,
            state: job.state,
            progress: job.progress,
            previous_attempts: job.previous_attempts,
            created: job.created,
            started: job.started,
            last_change: job.last_change,
            finished: job.finished,
            log: privileged.then(|| job.log.clone()).flatten(),
            log_user: job.log_user.clone(),
            images: images.iter().map(|i| ImageView::from_image(i, privileged)).collect(),
        }
    }

    /// ADMIN/WORKER see everything, including the internal technical log and
    /// image ids.
    pub fn full(job: &Job, images: &[Image]) -> Self {
        Self::new(job, images, true)
    }

    /// USER/READONLY see the redacted projection.
    pub fn redacted(job: &Job, images: &[Image]) -> Self {
        Self::new(job, images, false)
    }

    pub fn for_caller(job: &Job, images: &[Image], caller: &Key) -> Self {
        match caller.role {
            KeyRole::Admin | KeyRole::Worker => Self::full(job, images),
            KeyRole::User | KeyRole::Readonly => Self::redacted(job, images),
        }
    }
}

/// Returned by `POST /v1/jobs/lease` and any operation that extends a lease
/// (spec §6, `base_objects.py::JobLease`).
#[derive(Debug, Serialize)]
pub struct LeaseView {
    pub id: Uuid,
    pub lease_expire_at: DateTime<Utc>,
    pub server_time: DateTime<Utc>,
}

impl LeaseView {
    pub fn new(job_id: Uuid, last_change: DateTime<Utc>, job_timeout: chrono::Duration) -> Self {
        Self {
            id: job_id,
            lease_expire_at: last_change + job_timeout,
            server_time: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct KeyCreateRequest {
    pub label: String,
    pub role: KeyRole,
}

#[derive(Debug, Deserialize)]
pub struct KeyUpdateRequest {
    pub active: Option<bool>,
}

/// A freshly minted or rotated raw secret, shown exactly once (spec's
/// supplemented "Idempotent key creation" feature; `base_objects.py::KeySecret`).
#[derive(Debug, Serialize)]
pub struct KeySecretView {
    pub id: Uuid,
    pub label: String,
    pub role: KeyRole,
    pub active: bool,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct EngineCreateRequest {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct EngineUpdateRequest {
    pub active: Option<bool>,
}
