//! Core data types shared by every layer of the broker.
//!
//! These mirror the `jobs` / `images` / `keys` tables one-for-one; the
//! storage layer (`broker-postgres`) maps rows onto these structs instead of
//! defining its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The job state machine's states (spec §4.6). Wire value is lower-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    New,
    Queued,
    Processing,
    Error,
    Done,
    Failed,
    Cancelled,
}

impl ProcessingState {
    /// DONE, FAILED, CANCELLED never transition again (§4.6).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Error => "error",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Credential role (spec §3 Credential).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Readonly,
    User,
    Worker,
    Admin,
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Readonly => "readonly",
            Self::User => "user",
            Self::Worker => "worker",
            Self::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// Authentication principal (spec §3 Credential, called "Key").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub id: Uuid,
    pub label: String,
    pub role: KeyRole,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

/// One page of a job's input (spec §3 Image).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub job_id: Uuid,
    pub name: String,
    pub order: i32,
    pub imagehash: Option<String>,
    pub image_uploaded: bool,
    pub alto_uploaded: bool,
    pub page_uploaded: bool,
}

/// Which of an image's three artifact kinds an upload targets (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Alto,
    Page,
}

/// The central entity (spec §3 Job).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
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

    pub log: Option<String>,
    pub log_user: Option<String>,
}

impl Job {
    /// Lease deadline derived from `last_change`, not stored separately (spec §3 Lease).
    pub fn lease_deadline(&self, job_timeout: chrono::Duration) -> DateTime<Utc> {
        self.last_change + job_timeout
    }
}

/// A named, versioned processing configuration (spec §3 Engine). Selection
/// logic is out of scope; only the referenced row is managed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub active: bool,
}

/// What a newly created job requires, independent of its images (spec §4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct Requirements {
    pub alto_required: bool,
    pub page_required: bool,
    pub meta_json_required: bool,
}

/// Upload flags for one image, as read by the Readiness Evaluator (spec §4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFlags {
    pub image_uploaded: bool,
    pub alto_uploaded: bool,
    pub page_uploaded: bool,
}

/// One image to create alongside a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewImage {
    pub name: String,
    pub order: i32,
}
