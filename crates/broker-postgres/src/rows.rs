//! `sqlx::FromRow` mappings between table rows and `broker_core::types`.
//!
//! Kept separate from `store.rs` so the query bodies aren't buried under
//! field-by-field conversion code.

use broker_core::{Engine, Image, Job, Key, KeyRole, ProcessingState};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(FromRow)]
pub(crate) struct JobRow {
    pub id: Uuid,
    pub owner_key_id: Uuid,
    pub worker_key_id: Option<Uuid>,
    pub engine_id: Option<Uuid>,
    pub definition: serde_json::Value,
    pub alto_required: bool,
    pub page_required: bool,
    pub meta_json_required: bool,
    pub meta_json_uploaded: bool,
    pub state: String,
    pub progress: f64,
    pub previous_attempts: i32,
    pub created_date: chrono::DateTime<chrono::Utc>,
    pub started_date: Option<chrono::DateTime<chrono::Utc>>,
    pub last_change: chrono::DateTime<chrono::Utc>,
    pub finished_date: Option<chrono::DateTime<chrono::Utc>>,
    pub log: Option<String>,
    pub log_user: Option<String>,
}

impl From<JobRow> for Job {
    fn from(r: JobRow) -> Self {
        Job {
            id: r.id,
            owner_key_id: r.owner_key_id,
            worker_key_id: r.worker_key_id,
            engine_id: r.engine_id,
            definition: r.definition,
            alto_required: r.alto_required,
            page_required: r.page_required,
            meta_json_required: r.meta_json_required,
            meta_json_uploaded: r.meta_json_uploaded,
            state: parse_state(&r.state),
            progress: r.progress,
            previous_attempts: r.previous_attempts,
            created: r.created_date,
            started: r.started_date,
            last_change: r.last_change,
            finished: r.finished_date,
            log: r.log,
            log_user: r.log_user,
        }
    }
}

pub(crate) fn parse_state(s: &str) -> ProcessingState {
    match s {
        "new" => ProcessingState::New,
        "queued" => ProcessingState::Queued,
        "processing" => ProcessingState::Processing,
        "error" => ProcessingState::Error,
        "done" => ProcessingState::Done,
        "failed" => ProcessingState::Failed,
        "cancelled" => ProcessingState::Cancelled,
        other => unreachable!("unknown job_state enum value from database: {other}"),
    }
}


#[derive(FromRow)]
pub(crate) struct ImageRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub name: String,
    pub order: i32,
    pub imagehash: Option<String>,
    pub image_uploaded: bool,
    pub alto_uploaded: bool,
    pub page_uploaded: bool,
}

impl From<ImageRow> for Image {
    fn from(r: ImageRow) -> Self {
        Image {
            id: r.id,
            job_id: r.job_id,
            name: r.name,
            order: r.order,
            imagehash: r.imagehash,
            image_uploaded: r.image_uploaded,
            alto_uploaded: r.alto_uploaded,
            page_uploaded: r.page_uploaded,
        }
    }
}

#[derive(FromRow)]
pub(crate) struct KeyRow {
    pub id: Uuid,
    pub label: String,
    pub role: String,
    pub active: bool,
    pub created_date: chrono::DateTime<chrono::Utc>,
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<KeyRow> for Key {
    fn from(r: KeyRow) -> Self {
        Key {
            id: r.id,
            label: r.label,
            role: parse_role(&r.role),
            active: r.active,
            created: r.created_date,
            last_used: r.last_used,
        }
    }
}

pub(crate) fn parse_role(s: &str) -> KeyRole {
    match s {
        "readonly" => KeyRole::Readonly,
        "user" => KeyRole::User,
        "worker" => KeyRole::Worker,
        "admin" => KeyRole::Admin,
        other => unreachable!("unknown key_role enum value from database: {other}"),
    }
}

pub(crate) fn role_name(r: KeyRole) -> &'static str {
    match r {
        KeyRole::Readonly => "readonly",
        KeyRole::User => "user",
        KeyRole::Worker => "worker",
        KeyRole::Admin => "admin",
    }
}

#[derive(FromRow)]
pub(crate) struct EngineRow {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub active: bool,
}

impl From<EngineRow> for Engine {
    fn from(r: EngineRow) -> Self {
        Engine {
            id: r.id,
            name: r.name,
            version: r.version,
            active: r.active,
        }
    }
}
