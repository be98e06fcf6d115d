//! Typed error taxonomy (spec §7).
//!
//! Core functions never throw; every fallible path returns one of these
//! variants, paired with enough structured data to render the HTTP envelope
//! at the boundary without re-deriving it.

use crate::types::ProcessingState;
use thiserror::Error;
use uuid::Uuid;

/// One of the seven kinds from spec §7, each carrying what the HTTP layer
/// needs to pick a status code and `AppCode`.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("access to {entity} forbidden")]
    Forbidden { entity: &'static str },

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: ProcessingState,
        to: &'static str,
    },

    #[error("precondition failed: {0}")]
    Precondition(PreconditionCode),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("duplicate {entity}: '{value}'")]
    ConflictUniqueness { entity: &'static str, value: String },
}

/// Named precondition failures (spec §4.5, §4.6, §7) — distinct from a bare
/// illegal-transition because they carry their own `AppCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionCode {
    /// ALTO/PAGE upload attempted when not required by the job.
    AltoNotRequired,
    PageNotRequired,
    /// Completion attempted without a validated result artifact present.
    ResultMissing,
    /// Heartbeat/progress update carried neither progress nor log text.
    NoFields,
    /// Re-upload attempted while the job is no longer NEW.
    JobNotEditable,
    /// Heartbeat/progress/release/complete/fail attempted by a worker whose
    /// lease was reclaimed (spec §7 "Expired lease").
    NotInProcessing,
}

impl std::fmt::Display for PreconditionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AltoNotRequired => "ALTO not required for this job",
            Self::PageNotRequired => "PAGE not required for this job",
            Self::ResultMissing => "result artifact missing",
            Self::NoFields => "no fields supplied",
            Self::JobNotEditable => "job is no longer editable",
            Self::NotInProcessing => "job is not processing under this lease",
        };
        f.write_str(s)
    }
}

/// Store-level failure taxonomy (spec §4.1): transient failures are
/// retryable, not-found is a typed absent result, never an exception for a
/// normal miss.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity not found")]
    NotFound,

    #[error("transient storage failure: {0}")]
    Transient(#[source] anyhow::Error),

    /// A unique constraint was violated. `field` names which one (e.g.
    /// `"key_hash"`, `"label"`) so callers can tell a vanishingly-rare
    /// HMAC collision (retry with a fresh secret) apart from a genuine
    /// duplicate label (fail fast).
    #[error("duplicate {field}: '{value}'")]
    Conflict { field: &'static str, value: String },
}

impl BrokerError {
    /// Converts a `StoreError` from an id-keyed lookup/update into a typed
    /// 404 when the row is simply absent, rather than letting every store
    /// miss fall through to an opaque `Storage` (500) error.
    pub fn from_store_lookup(e: StoreError, entity: &'static str, id: Uuid) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound { entity, id },
            other => Self::Storage(other),
        }
    }
}

/// Outcome of an access-guard check (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Ok,
    NotFound,
    Forbidden,
    Conflict,
}
