//! Storage-agnostic core of the document-processing job broker.
//!
//! A `Job` moves through a small state machine (`NEW -> QUEUED ->
//! PROCESSING -> {DONE | ERROR | FAILED | CANCELLED}`) driven by three
//! independent actors: the owner who creates it and uploads its inputs, the
//! worker who claims and processes it, and a background sweeper that
//! reclaims timed-out or errored jobs until a retry budget is exhausted.
//!
//! This crate defines that state machine, the readiness predicate that
//! gates NEW -> QUEUED, the retry/dead-letter policy, the access guards, and
//! the [`Store`] trait every persistence backend implements — but it never
//! touches a database itself. `broker-postgres` is the only crate that
//! does; everything here is pure enough to unit test without one.
//!
//! The module split:
//!
//! - [`types`] — the wire/storage vocabulary (`Job`, `Image`, `Key`, ...).
//! - [`error`] — the typed failure taxonomy every fallible path returns.
//! - [`readiness`] — the pure upload-completeness predicate.
//! - [`sweeper`] — retry/timeout/dead-letter policy.
//! - [`lifecycle`] — the progress-log append rule.
//! - [`guards`] — who may act on which job.
//! - [`store`] — the persistence seam (`Store` trait) and its outcome types.
//! - [`dispatcher`] — guarded job creation/retrieval/cancel/claim.
//! - [`lease`] — guarded worker-side heartbeat/progress/complete/fail.

pub mod dispatcher;
pub mod error;
pub mod guards;
pub mod lease;
pub mod lifecycle;
pub mod readiness;
pub mod store;
pub mod sweeper;
pub mod types;

pub use dispatcher::Dispatcher;
pub use error::{BrokerError, GuardOutcome, PreconditionCode, StoreError};
pub use lease::LeaseManager;
pub use lifecycle::append_log;
pub use store::{
    CancelOutcome, ClaimOutcome, CompleteOutcome, FailOutcome, HeartbeatOutcome, ProgressOutcome,
    ReleaseOutcome, Store, UploadOutcome,
};
pub use sweeper::SweeperPolicy;
pub use types::{ArtifactKind, Engine, Image, ImageFlags, Job, Key, KeyRole, NewImage, ProcessingState, Requirements};
