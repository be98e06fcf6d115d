//! Shared fixtures and builders for testing the document-processing broker.
//!
//! Kept as its own crate so both `broker-postgres`'s integration tests and
//! `broker-server`'s route tests can build a `Job`/`Key`/`Requirements` from
//! the same small set of builders instead of hand-rolling structs inline.

use broker_core::{ImageFlags, Job, Key, KeyRole, NewImage, ProcessingState, Requirements};
use chrono::Utc;
use uuid::Uuid;

/// Builds a [`Key`] with sane defaults, overridable via the chained setters.
pub struct KeyBuilder {
    key: Key,
}

impl KeyBuilder {
    pub fn new(role: KeyRole) -> Self {
        Self {
            key: Key {
                id: Uuid::new_v4(),
                label: format!("test-{}-{}", role, fastrand::u32(..)),
                role,
                active: true,
                created: Utc::now(),
                last_used: None,
            },
        }
    }

    pub fn inactive(mut self) -> Self {
        self.key.active = false;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.key.label = label.into();
        self
    }

    pub fn build(self) -> Key {
        self.key
    }
}

/// Builds a [`Job`] with sane defaults for unit tests that need a fully
/// formed row without going through a `Store`.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(owner_key_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            job: Job {
                id: Uuid::new_v4(),
                owner_key_id,
                worker_key_id: None,
                engine_id: None,
                definition: serde_json::json!({}),
                alto_required: false,
                page_required: false,
                meta_json_required: false,
                meta_json_uploaded: false,
                state: ProcessingState::New,
                progress: 0.0,
                previous_attempts: 0,
                created: now,
                started: None,
                last_change: now,
                finished: None,
                log: None,
                log_user: None,
            },
        }
    }

    pub fn state(mut self, state: ProcessingState) -> Self {
        self.job.state = state;
        self
    }

    pub fn worker(mut self, worker_key_id: Uuid) -> Self {
        self.job.worker_key_id = Some(worker_key_id);
        self
    }

    pub fn requirements(mut self, requirements: Requirements) -> Self {
        self.job.alto_required = requirements.alto_required;
        self.job.page_required = requirements.page_required;
        self.job.meta_json_required = requirements.meta_json_required;
        self
    }

    pub fn last_change(mut self, last_change: chrono::DateTime<Utc>) -> Self {
        self.job.last_change = last_change;
        self
    }

    pub fn previous_attempts(mut self, n: i32) -> Self {
        self.job.previous_attempts = n;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

pub fn new_image(name: &str, order: i32) -> NewImage {
    NewImage {
        name: name.to_string(),
        order,
    }
}

pub fn complete_image_flags() -> ImageFlags {
    ImageFlags {
        image_uploaded: true,
        alto_uploaded: true,
        page_uploaded: true,
    }
}
