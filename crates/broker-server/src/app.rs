//! Router assembly (spec §6): wires every handler in `routes` onto its path,
//! grounded on `fourthplaces-mntogether`'s `server::app::build_app` — a
//! plain `Router::new().route(...)` chain with `tower-http` layers for
//! tracing and CORS, rather than anything macro-generated.

use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::state::AppState;

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Builds the full axum `Router` for the broker (spec §6's path list).
/// Upload bodies are capped well above a typical page scan; bigger result
/// archives should be streamed to a proper object store, out of scope here.
pub fn build_app(state: AppState) -> Router {
    const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

    let jobs = Router::new()
        .route("/", post(routes::create_job).get(routes::list_jobs))
        .route("/lease", post(routes::claim_job))
        .route("/:id", get(routes::get_job).patch(routes::patch_job))
        .route("/:id/lease", patch(routes::heartbeat_lease).delete(routes::release_lease))
        .route("/:id/images/:name/files/image", put(routes::upload_image))
        .route("/:id/images/:name/files/alto", put(routes::upload_alto))
        .route("/:id/images/:name/files/page", put(routes::upload_page))
        .route("/:id/files/metadata", put(routes::upload_metadata))
        .route("/:id/result", post(routes::upload_result).get(routes::download_result));

    let admin = Router::new()
        .route("/keys", post(routes::create_key).get(routes::list_keys))
        .route("/keys/:id", patch(routes::update_key))
        .route("/engines", post(routes::create_engine).get(routes::list_engines))
        .route("/engines/:id", patch(routes::update_engine).delete(routes::delete_engine));

    Router::new()
        .route("/health", get(health))
        .route("/v1/me", get(routes::get_me))
        .nest("/v1/jobs", jobs)
        .nest("/v1/admin", admin)
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
