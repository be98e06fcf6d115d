//! Translates `BrokerError` into the HTTP envelope (spec §7). This is the
//! only place that knows about status codes — core logic never does.

use crate::envelope::{err, err_detail, AppCode};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use broker_core::{BrokerError, PreconditionCode};

pub struct ApiError(pub BrokerError);

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            BrokerError::NotFound { entity, id } => {
                let code = match entity {
                    "key" => AppCode::KeyNotFound,
                    "engine" => AppCode::EngineNotFound,
                    "image" => AppCode::ImageNotFoundForJob,
                    _ => AppCode::JobNotFound,
                };
                err_detail(StatusCode::NOT_FOUND, code, format!("{entity} '{id}' not found"))
            }
            BrokerError::Forbidden { entity } => {
                err_detail(StatusCode::FORBIDDEN, AppCode::ForbiddenForJob, format!("access to {entity} forbidden"))
            }
            BrokerError::IllegalTransition { from, to } => err_detail(
                StatusCode::CONFLICT,
                AppCode::JobNotEditable,
                format!("cannot transition from {from} to {to}"),
            ),
            BrokerError::Precondition(code) => precondition_response(code),
            BrokerError::Validation(detail) => err_detail(StatusCode::BAD_REQUEST, AppCode::RequestValidationError, detail),
            BrokerError::Storage(storage_error) => {
                tracing::error!(error = %storage_error, "store operation failed");
                err(StatusCode::INTERNAL_SERVER_ERROR, AppCode::InternalError)
            }
            BrokerError::ConflictUniqueness { entity, value } => {
                let code = match entity {
                    "label" => AppCode::KeyAlreadyExists,
                    "name_version" => AppCode::EngineAlreadyExists,
                    "key_hash" => AppCode::KeyCreationFailed,
                    _ => AppCode::RequestValidationError,
                };
                err_detail(StatusCode::CONFLICT, code, format!("duplicate {entity}: '{value}'"))
            }
        }
    }
}

fn precondition_response(code: PreconditionCode) -> Response {
    match code {
        PreconditionCode::AltoNotRequired => err(StatusCode::BAD_REQUEST, AppCode::AltoNotRequired),
        PreconditionCode::PageNotRequired => err(StatusCode::BAD_REQUEST, AppCode::PageNotRequired),
        PreconditionCode::ResultMissing => err(StatusCode::CONFLICT, AppCode::ResultMissing),
        PreconditionCode::NoFields => err(StatusCode::BAD_REQUEST, AppCode::RequestValidationError),
        PreconditionCode::JobNotEditable => err(StatusCode::CONFLICT, AppCode::JobNotEditable),
        PreconditionCode::NotInProcessing => err(StatusCode::CONFLICT, AppCode::JobNotInProcessing),
    }
}
