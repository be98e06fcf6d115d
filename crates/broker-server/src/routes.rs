//! Handlers for the HTTP surface (spec §6). Every handler is a plain async
//! function taking axum extractors and returning a `Response` built through
//! the `envelope` helpers — grounded on `fourthplaces-mntogether`'s
//! `graphql.rs` handler style, since the teacher carries no HTTP layer of
//! its own. Role/ownership checks and state transitions all live in
//! `broker-core`; a handler's job is just to extract the request, call the
//! guarded core API, and pick the status code and `AppCode` for the result.

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use broker_core::guards::worker_access;
use broker_core::{ArtifactKind, BrokerError, KeyRole, PreconditionCode, ProcessingState, Store, UploadOutcome};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::{hmac_sha256_hex, AuthenticatedKey};
use crate::blobs;
use crate::dto::{
    EngineCreateRequest, EngineUpdateRequest, JobCreateRequest, JobPatchRequest, JobView, KeyCreateRequest,
    KeySecretView, KeyUpdateRequest, LeaseView,
};
use crate::envelope::{err, err_detail, ok, AppCode};
use crate::error::ApiError;
use crate::state::AppState;
use crate::validators;

fn job_timeout(state: &AppState) -> chrono::Duration {
    chrono::Duration::seconds(state.config.job_timeout_seconds)
}

// ---------------------------------------------------------------- identity

pub async fn get_me(AuthenticatedKey(caller): AuthenticatedKey) -> Response {
    ok(StatusCode::OK, AppCode::ApiKeyValid, Some(caller))
}

// -------------------------------------------------------------------- jobs

pub async fn create_job(
    State(state): State<AppState>,
    auth: AuthenticatedKey,
    Json(body): Json<JobCreateRequest>,
) -> Response {
    if let Err(e) = auth.require_role(&[KeyRole::User]) {
        return e.into_response();
    }
    let caller = auth.0;
    let requirements = body.requirements();
    let engine_id = body.engine_id;
    let definition = body.definition.clone();
    let images = body.images.into_iter().map(Into::into).collect();

    match state.dispatcher.create_job(&caller, engine_id, definition, requirements, images).await {
        Ok(job) => {
            let images = state.dispatcher.get_images(&caller, job.id).await.unwrap_or_default();
            ok(StatusCode::CREATED, AppCode::JobCreated, Some(JobView::full(&job, &images)))
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn list_jobs(State(state): State<AppState>, AuthenticatedKey(caller): AuthenticatedKey) -> Response {
    match state.dispatcher.list_jobs(&caller).await {
        Ok(jobs) => {
            let views: Vec<JobView> = jobs.iter().map(|job| JobView::for_caller(job, &[], &caller)).collect();
            ok(StatusCode::OK, AppCode::JobsRetrieved, Some(views))
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn get_job(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path(job_id): Path<Uuid>,
) -> Response {
    let job = match state.dispatcher.get_job(&caller, job_id).await {
        Ok(job) => job,
        Err(e) => return ApiError::from(e).into_response(),
    };
    let images = state.dispatcher.get_images(&caller, job_id).await.unwrap_or_default();
    ok(StatusCode::OK, AppCode::JobRetrieved, Some(JobView::for_caller(&job, &images, &caller)))
}

/// Polymorphic across caller role (spec §6, grounded on
/// `general_routes.py`'s single `PATCH /job/{id}` dispatch): USER cancels,
/// WORKER finalizes or updates progress, ADMIN may do either.
pub async fn patch_job(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path(job_id): Path<Uuid>,
    Json(body): Json<JobPatchRequest>,
) -> Response {
    let can_cancel = matches!(caller.role, KeyRole::User | KeyRole::Admin);
    let can_work = matches!(caller.role, KeyRole::Worker | KeyRole::Admin);

    match body.state {
        Some(ProcessingState::Cancelled) => {
            if !can_cancel {
                return err(StatusCode::FORBIDDEN, AppCode::RoleForbidden);
            }
            match state.dispatcher.cancel_job(&caller, job_id).await {
                Ok(()) => ok(StatusCode::OK, AppCode::JobCancelled, None::<()>),
                Err(e) => ApiError::from(e).into_response(),
            }
        }
        Some(ProcessingState::Done) => {
            if !can_work {
                return err(StatusCode::FORBIDDEN, AppCode::RoleForbidden);
            }
            let result_exists = tokio::fs::try_exists(state.config.result_path(job_id)).await.unwrap_or(false);
            if !result_exists {
                return ApiError::from(BrokerError::Precondition(PreconditionCode::ResultMissing)).into_response();
            }
            match state.lease.complete(&caller, job_id).await {
                Ok(true) => ok(StatusCode::OK, AppCode::JobAlreadyCompleted, None::<()>),
                Ok(false) => ok(StatusCode::OK, AppCode::JobCompleted, None::<()>),
                Err(e) => ApiError::from(e).into_response(),
            }
        }
        Some(ProcessingState::Error) => {
            if !can_work {
                return err(StatusCode::FORBIDDEN, AppCode::RoleForbidden);
            }
            match state.lease.fail(&caller, job_id).await {
                Ok(true) => ok(StatusCode::OK, AppCode::JobAlreadyFailed, None::<()>),
                Ok(false) => ok(StatusCode::OK, AppCode::JobFailed, None::<()>),
                Err(e) => ApiError::from(e).into_response(),
            }
        }
        Some(_) => err(StatusCode::FORBIDDEN, AppCode::RoleForbidden),
        None => {
            if !can_work {
                return err(StatusCode::FORBIDDEN, AppCode::RoleForbidden);
            }
            if let Err(e) = state.lease.update_progress(&caller, job_id, body.progress, body.log, body.log_user).await
            {
                return ApiError::from(e).into_response();
            }
            refetch_lease(&state, job_id, AppCode::JobUpdated).await
        }
    }
}

async fn refetch_lease(state: &AppState, job_id: Uuid, code: AppCode) -> Response {
    match state.store.get_job(job_id).await {
        Ok(job) => ok(StatusCode::OK, code, Some(LeaseView::new(job.id, job.last_change, job_timeout(state)))),
        Err(e) => ApiError::from(BrokerError::from_store_lookup(e, "job", job_id)).into_response(),
    }
}

// ------------------------------------------------------------------- lease

pub async fn claim_job(State(state): State<AppState>, auth: AuthenticatedKey) -> Response {
    if let Err(e) = auth.require_role(&[KeyRole::Worker]) {
        return e.into_response();
    }
    let policy = state.config.sweeper_policy();
    match state.dispatcher.claim_one(&auth.0, &policy).await {
        Ok(Some(job)) => {
            ok(StatusCode::OK, AppCode::JobAssigned, Some(LeaseView::new(job.id, job.last_change, job_timeout(&state))))
        }
        Ok(None) => ok(StatusCode::OK, AppCode::JobQueueEmpty, None::<()>),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn heartbeat_lease(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path(job_id): Path<Uuid>,
) -> Response {
    if let Err(e) = state.lease.heartbeat(&caller, job_id).await {
        return ApiError::from(e).into_response();
    }
    refetch_lease(&state, job_id, AppCode::JobHeartbeatAccepted).await
}

pub async fn release_lease(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path(job_id): Path<Uuid>,
) -> Response {
    match state.lease.release(&caller, job_id).await {
        Ok(()) => ok(StatusCode::NO_CONTENT, AppCode::JobLeaseReleased, None::<()>),
        Err(e) => ApiError::from(e).into_response(),
    }
}

// --------------------------------------------------------------- artifacts

async fn first_multipart_field_bytes(multipart: &mut Multipart) -> Result<Bytes, Response> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| err_detail(StatusCode::BAD_REQUEST, AppCode::RequestValidationError, format!("invalid upload body: {e}")))?
        .ok_or_else(|| err_detail(StatusCode::BAD_REQUEST, AppCode::RequestValidationError, "no file part in upload"))?;
    field
        .bytes()
        .await
        .map_err(|e| err_detail(StatusCode::BAD_REQUEST, AppCode::RequestValidationError, format!("failed to read upload: {e}")))
}

fn upload_codes(kind: ArtifactKind) -> (AppCode, AppCode) {
    match kind {
        ArtifactKind::Image => (AppCode::ImageUploaded, AppCode::ImageReuploaded),
        ArtifactKind::Alto => (AppCode::AltoUploaded, AppCode::AltoReuploaded),
        ArtifactKind::Page => (AppCode::PageUploaded, AppCode::PageReuploaded),
    }
}

/// Shared body for the three `PUT .../images/{name}/files/{kind}` routes
/// (spec §4.8, §6): checks the job is still editable and the artifact is
/// actually required, validates the payload, writes it atomically, then
/// records it with the dispatcher.
async fn upload_artifact(
    state: &AppState,
    caller: &broker_core::Key,
    job_id: Uuid,
    image_name: &str,
    kind: ArtifactKind,
    mut multipart: Multipart,
) -> Response {
    let job = match state.dispatcher.get_job(caller, job_id).await {
        Ok(job) => job,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if job.state != ProcessingState::New {
        return ApiError::from(BrokerError::Precondition(PreconditionCode::JobNotEditable)).into_response();
    }
    match kind {
        ArtifactKind::Alto if !job.alto_required => return err(StatusCode::BAD_REQUEST, AppCode::AltoNotRequired),
        ArtifactKind::Page if !job.page_required => return err(StatusCode::BAD_REQUEST, AppCode::PageNotRequired),
        _ => {}
    }

    let bytes = match first_multipart_field_bytes(&mut multipart).await {
        Ok(bytes) => bytes,
        Err(resp) => return resp,
    };

    let imagehash = match kind {
        ArtifactKind::Image => {
            if let Err(resp) = validators::validate_image(&bytes) {
                return resp;
            }
            Some(hex::encode(Sha256::digest(&bytes)))
        }
        ArtifactKind::Alto => {
            let expect_root = state.config.alto_schema_validation.then_some("alto");
            if let Err(resp) = validators::validate_xml(&bytes, expect_root) {
                return resp;
            }
            None
        }
        ArtifactKind::Page => {
            let expect_root = state.config.alto_schema_validation.then_some("PcGts");
            if let Err(resp) = validators::validate_xml(&bytes, expect_root) {
                return resp;
            }
            None
        }
    };

    let job_dir = state.config.job_dir(job_id);
    let path = match kind {
        ArtifactKind::Image => blobs::image_path(&job_dir, image_name),
        ArtifactKind::Alto => blobs::alto_path(&job_dir, image_name),
        ArtifactKind::Page => blobs::page_path(&job_dir, image_name),
    };
    if let Err(e) = blobs::write_atomic(&path, &bytes).await {
        tracing::error!(error = %e, %job_id, image_name, "failed to write artifact to disk");
        return err(StatusCode::INTERNAL_SERVER_ERROR, AppCode::InternalError);
    }

    let (created_code, reuploaded_code) = upload_codes(kind);
    match state.dispatcher.mark_uploaded(caller, job_id, image_name, kind, imagehash).await {
        Ok(UploadOutcome::Reuploaded) => ok(StatusCode::OK, reuploaded_code, None::<()>),
        Ok(UploadOutcome::Recorded | UploadOutcome::RecordedAndEnqueued) => {
            ok(StatusCode::CREATED, created_code, None::<()>)
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn upload_image(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path((job_id, image_name)): Path<(Uuid, String)>,
    multipart: Multipart,
) -> Response {
    upload_artifact(&state, &caller, job_id, &image_name, ArtifactKind::Image, multipart).await
}

pub async fn upload_alto(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path((job_id, image_name)): Path<(Uuid, String)>,
    multipart: Multipart,
) -> Response {
    upload_artifact(&state, &caller, job_id, &image_name, ArtifactKind::Alto, multipart).await
}

pub async fn upload_page(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path((job_id, image_name)): Path<(Uuid, String)>,
    multipart: Multipart,
) -> Response {
    upload_artifact(&state, &caller, job_id, &image_name, ArtifactKind::Page, multipart).await
}

pub async fn upload_metadata(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path(job_id): Path<Uuid>,
    body: Bytes,
) -> Response {
    let job = match state.dispatcher.get_job(&caller, job_id).await {
        Ok(job) => job,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if job.state != ProcessingState::New {
        return ApiError::from(BrokerError::Precondition(PreconditionCode::JobNotEditable)).into_response();
    }
    if !job.meta_json_required {
        return err(StatusCode::BAD_REQUEST, AppCode::MetaJsonNotRequired);
    }
    if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        return err_detail(StatusCode::UNPROCESSABLE_ENTITY, AppCode::RequestValidationError, "metadata is not valid JSON");
    }

    let job_dir = state.config.job_dir(job_id);
    let path = blobs::metadata_path(&job_dir);
    if let Err(e) = blobs::write_atomic(&path, &body).await {
        tracing::error!(error = %e, %job_id, "failed to write metadata to disk");
        return err(StatusCode::INTERNAL_SERVER_ERROR, AppCode::InternalError);
    }

    match state.dispatcher.mark_metadata_uploaded(&caller, job_id).await {
        Ok(UploadOutcome::Reuploaded) => ok(StatusCode::OK, AppCode::MetaJsonReuploaded, None::<()>),
        Ok(UploadOutcome::Recorded | UploadOutcome::RecordedAndEnqueued) => {
            ok(StatusCode::CREATED, AppCode::MetaJsonUploaded, None::<()>)
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

// ----------------------------------------------------------------- result

pub async fn upload_result(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path(job_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Response {
    let job = match state.store.get_job(job_id).await {
        Ok(job) => job,
        Err(e) => return ApiError::from(BrokerError::from_store_lookup(e, "job", job_id)).into_response(),
    };
    if let Err(e) = worker_access(&job, &caller).into_result("job", job_id) {
        return ApiError::from(e).into_response();
    }

    let bytes = match first_multipart_field_bytes(&mut multipart).await {
        Ok(bytes) => bytes,
        Err(resp) => return resp,
    };
    if state.config.result_zip_validation {
        if let Err(resp) = validators::validate_zip(&bytes, AppCode::ResultZipInvalid) {
            return resp;
        }
    }

    let result_path = state.config.result_path(job_id);
    let already_existed = tokio::fs::try_exists(&result_path).await.unwrap_or(false);
    if let Err(e) = blobs::write_atomic(&result_path, &bytes).await {
        tracing::error!(error = %e, %job_id, "failed to write result archive to disk");
        return err(StatusCode::INTERNAL_SERVER_ERROR, AppCode::InternalError);
    }

    let code = if already_existed { AppCode::ResultZipReuploaded } else { AppCode::ResultZipUploaded };
    ok(StatusCode::OK, code, None::<()>)
}

pub async fn download_result(
    State(state): State<AppState>,
    AuthenticatedKey(caller): AuthenticatedKey,
    Path(job_id): Path<Uuid>,
) -> Response {
    let job = match state.dispatcher.get_job(&caller, job_id).await {
        Ok(job) => job,
        Err(e) => return ApiError::from(e).into_response(),
    };
    match job.state {
        ProcessingState::New | ProcessingState::Queued | ProcessingState::Processing => {
            err(StatusCode::TOO_EARLY, AppCode::ResultNotReady)
        }
        ProcessingState::Cancelled | ProcessingState::Failed | ProcessingState::Error => {
            err(StatusCode::GONE, AppCode::ResultGone)
        }
        ProcessingState::Done => match tokio::fs::read(state.config.result_path(job_id)).await {
            Ok(bytes) => {
                let mut response = (StatusCode::OK, bytes).into_response();
                response
                    .headers_mut()
                    .insert(axum::http::header::CONTENT_TYPE, "application/zip".parse().expect("static mime type"));
                response
            }
            Err(e) => {
                tracing::error!(error = %e, %job_id, "result archive missing for a DONE job");
                err(StatusCode::INTERNAL_SERVER_ERROR, AppCode::InternalError)
            }
        },
    }
}

// -------------------------------------------------------------- admin keys

fn generate_raw_key(prefix: &str) -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{prefix}{}", hex::encode(bytes))
}

/// Retries on an HMAC key-hash collision (vanishingly rare) but fails fast
/// on a duplicate label, mirroring `admin_routes.py::create_key`'s
/// collision-retry loop.
pub async fn create_key(
    State(state): State<AppState>,
    auth: AuthenticatedKey,
    Json(body): Json<KeyCreateRequest>,
) -> Response {
    if let Err(e) = auth.require_role(&[KeyRole::Admin]) {
        return e.into_response();
    }
    const MAX_ATTEMPTS: u32 = 3;
    for attempt in 1..=MAX_ATTEMPTS {
        let raw_key = generate_raw_key(&state.config.key_prefix);
        let key_hash = hmac_sha256_hex(&raw_key, &state.config.hmac_secret);
        match state.dispatcher.create_key(&auth.0, body.label.clone(), body.role, key_hash).await {
            Ok(key) => {
                let view = KeySecretView { id: key.id, label: key.label, role: key.role, active: key.active, secret: raw_key };
                return ok(StatusCode::CREATED, AppCode::KeyCreated, Some(view));
            }
            Err(BrokerError::ConflictUniqueness { entity: "key_hash", .. }) if attempt < MAX_ATTEMPTS => continue,
            Err(e) => return ApiError::from(e).into_response(),
        }
    }
    err(StatusCode::CONFLICT, AppCode::KeyCreationFailed)
}

pub async fn list_keys(State(state): State<AppState>, auth: AuthenticatedKey) -> Response {
    if let Err(e) = auth.require_role(&[KeyRole::Admin]) {
        return e.into_response();
    }
    match state.dispatcher.list_keys(&auth.0).await {
        Ok(keys) => ok(StatusCode::OK, AppCode::KeysRetrieved, Some(keys)),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn update_key(
    State(state): State<AppState>,
    auth: AuthenticatedKey,
    Path(key_id): Path<Uuid>,
    Json(body): Json<KeyUpdateRequest>,
) -> Response {
    if let Err(e) = auth.require_role(&[KeyRole::Admin]) {
        return e.into_response();
    }
    if body.active.is_none() {
        return err(StatusCode::BAD_REQUEST, AppCode::KeyUpdateNoFields);
    }
    match state.dispatcher.update_key(&auth.0, key_id, body.active).await {
        Ok(key) => ok(StatusCode::OK, AppCode::KeyUpdated, Some(key)),
        Err(e) => ApiError::from(e).into_response(),
    }
}

// ----------------------------------------------------------- admin engines

pub async fn create_engine(
    State(state): State<AppState>,
    auth: AuthenticatedKey,
    Json(body): Json<EngineCreateRequest>,
) -> Response {
    if let Err(e) = auth.require_role(&[KeyRole::Admin]) {
        return e.into_response();
    }
    match state.dispatcher.create_engine(&auth.0, body.name, body.version).await {
        Ok(engine) => ok(StatusCode::CREATED, AppCode::EngineCreated, Some(engine)),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn list_engines(State(state): State<AppState>, auth: AuthenticatedKey) -> Response {
    if let Err(e) = auth.require_role(&[KeyRole::Admin]) {
        return e.into_response();
    }
    match state.dispatcher.list_engines(&auth.0).await {
        Ok(engines) => ok(StatusCode::OK, AppCode::EnginesRetrieved, Some(engines)),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn update_engine(
    State(state): State<AppState>,
    auth: AuthenticatedKey,
    Path(engine_id): Path<Uuid>,
    Json(body): Json<EngineUpdateRequest>,
) -> Response {
    if let Err(e) = auth.require_role(&[KeyRole::Admin]) {
        return e.into_response();
    }
    if body.active.is_none() {
        return err(StatusCode::BAD_REQUEST, AppCode::EngineUpdateNoFields);
    }
    match state.dispatcher.update_engine(&auth.0, engine_id, body.active).await {
        Ok(engine) => ok(StatusCode::OK, AppCode::EngineUpdated, Some(engine)),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Engines are never hard-deleted (spec's supplemented engine registry):
/// `DELETE` just forces `active = false` through the same path `PATCH` uses.
pub async fn delete_engine(
    State(state): State<AppState>,
    auth: AuthenticatedKey,
    Path(engine_id): Path<Uuid>,
) -> Response {
    if let Err(e) = auth.require_role(&[KeyRole::Admin]) {
        return e.into_response();
    }
    match state.dispatcher.update_engine(&auth.0, engine_id, Some(false)).await {
        Ok(engine) => ok(StatusCode::OK, AppCode::EngineUpdated, Some(engine)),
        Err(e) => ApiError::from(e).into_response(),
    }
}
