//! The uniform response envelope (spec §6): every 2xx/4xx/5xx response is
//! `{status, code, detail, data?}`, except 204/205 which carry no body at
//! all — grounded on the original's `DocAPIResponseBase` family.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Machine-readable response codes (spec §6). Named after the action and
/// its outcome, not the HTTP status, so clients can branch on semantics.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppCode {
    JobCreated,
    JobRetrieved,
    JobsRetrieved,
    JobCancelled,
    JobNotFound,
    JobNotEditable,

    ImageUploaded,
    ImageReuploaded,
    AltoUploaded,
    AltoReuploaded,
    AltoNotRequired,
    PageUploaded,
    PageReuploaded,
    PageNotRequired,
    MetaJsonUploaded,
    MetaJsonReuploaded,
    MetaJsonNotRequired,
    ImageNotFoundForJob,

    JobQueueEmpty,
    JobAssigned,
    JobHeartbeatAccepted,
    JobUpdated,
    JobCompleted,
    JobAlreadyCompleted,
    JobFailed,
    JobAlreadyFailed,
    JobNotInProcessing,

    ResultRetrieved,
    ResultNotReady,
    ResultGone,
    ResultMissing,

    KeyCreated,
    KeyUpdated,
    KeysRetrieved,
    KeyNotFound,
    KeyAlreadyExists,
    KeyCreationFailed,
    KeyUpdateNoFields,

    EngineCreated,
    EngineUpdated,
    EnginesRetrieved,
    EngineNotFound,
    EngineAlreadyExists,
    EngineUpdateNoFields,

    ResultZipUploaded,
    ResultZipReuploaded,
    ResultZipInvalid,

    JobLeaseReleased,

    ApiKeyValid,
    ApiKeyMissing,
    ApiKeyInvalid,
    ApiKeyInactive,
    RoleForbidden,
    ForbiddenForJob,

    RequestValidationError,
    InternalError,
}

impl AppCode {
    fn default_detail(self) -> &'static str {
        use AppCode::*;
        match self {
            JobCreated => "job created",
            JobRetrieved => "job retrieved",
            JobsRetrieved => "jobs retrieved",
            JobCancelled => "job cancelled",
            JobNotFound => "job not found",
            JobNotEditable => "job is no longer editable",
            ImageUploaded => "image uploaded",
            ImageReuploaded => "image re-uploaded",
            AltoUploaded => "ALTO uploaded",
            AltoReuploaded => "ALTO re-uploaded",
            AltoNotRequired => "ALTO not required for this job",
            PageUploaded => "PAGE uploaded",
            PageReuploaded => "PAGE re-uploaded",
            PageNotRequired => "PAGE not required for this job",
            MetaJsonUploaded => "metadata uploaded",
            MetaJsonReuploaded => "metadata re-uploaded",
            MetaJsonNotRequired => "metadata not required for this job",
            ImageNotFoundForJob => "image not found for this job",
            JobQueueEmpty => "no job currently ready to claim",
            JobAssigned => "job assigned",
            JobHeartbeatAccepted => "heartbeat accepted",
            JobUpdated => "job updated",
            JobCompleted => "job completed",
            JobAlreadyCompleted => "job was already completed",
            JobFailed => "job marked failed",
            JobAlreadyFailed => "job was already marked failed",
            JobNotInProcessing => "job is not processing under this lease",
            ResultRetrieved => "result retrieved",
            ResultNotReady => "result not ready yet",
            ResultGone => "job ended without a result",
            ResultMissing => "no validated result artifact is present",
            KeyCreated => "key created",
            KeyUpdated => "key updated",
            KeysRetrieved => "keys retrieved",
            KeyNotFound => "key not found",
            KeyAlreadyExists => "a key with that label already exists",
            KeyCreationFailed => "failed to create key after repeated hash collisions",
            KeyUpdateNoFields => "at least one field must be provided to update the key",
            EngineCreated => "engine created",
            EngineUpdated => "engine updated",
            EnginesRetrieved => "engines retrieved",
            EngineNotFound => "engine not found",
            EngineAlreadyExists => "an engine with that name and version already exists",
            EngineUpdateNoFields => "at least one field must be provided to update the engine",
            ResultZipUploaded => "result archive uploaded",
            ResultZipReuploaded => "result archive re-uploaded",
            ResultZipInvalid => "the uploaded file is not a valid ZIP archive",
            JobLeaseReleased => "lease released",
            ApiKeyValid => "API key is valid",
            ApiKeyMissing => "no API key supplied",
            ApiKeyInvalid => "API key is invalid",
            ApiKeyInactive => "API key is inactive",
            RoleForbidden => "role is not permitted to perform this action",
            ForbiddenForJob => "not permitted to act on this job",
            RequestValidationError => "request failed validation",
            InternalError => "internal error",
        }
    }
}

#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: u16,
    pub code: AppCode,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(status: StatusCode, code: AppCode, data: Option<T>) -> Self {
        Self {
            status: status.as_u16(),
            code,
            detail: code.default_detail().to_string(),
            data,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Builds the (status, body) pair for a 2xx envelope. 204/205 carry no
/// body at all (spec §6), matching the original's empty-body validation
/// rule for those two statuses.
pub fn ok<T: Serialize>(status: StatusCode, code: AppCode, data: Option<T>) -> Response {
    if status == StatusCode::NO_CONTENT || status.as_u16() == 205 {
        return status.into_response();
    }
    (status, Json(Envelope::new(status, code, data))).into_response()
}

pub fn err(status: StatusCode, code: AppCode) -> Response {
    (status, Json(Envelope::<()>::new(status, code, None))).into_response()
}

pub fn err_detail(status: StatusCode, code: AppCode, detail: impl Into<String>) -> Response {
    (status, Json(Envelope::<()>::new(status, code, None).with_detail(detail))).into_response()
}
