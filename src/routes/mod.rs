pub mod backup;
pub mod health;
pub mod restore;
pub mod system;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::OwnedSemaphorePermit;
use tower_http::compression::predicate::{DefaultPredicate, NotForContentType, Predicate};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::ApiKeyLayer;
use crate::error::AppError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api_key = state.config.api_key.clone();
    let max_upload = state.config.max_upload_size as usize;

    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health::health));

    // Authenticated API routes
    let api_routes = Router::new()
        .route("/status", get(health::status))
        .route("/backup", get(backup::download_backup))
        .route(
            "/restore",
            post(restore::restore_backup).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/system/reconcile", post(system::reconcile))
        .route("/system/reset", post(system::reset_settings))
        .route("/system/format", post(system::format_file_system))
        .layer(ApiKeyLayer::new(&api_key));

    // Artifacts are already gzip; only compress the JSON responses.
    let compression = CompressionLayer::new().compress_when(
        DefaultPredicate::new().and(NotForContentType::const_new("application/gzip")),
    );

    let origins = state.config.cors_allowed_origins.trim();
    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .split(',')
                .filter_map(|o| o.trim().parse::<http::HeaderValue>().ok()),
        )
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    let x_request_id = http::HeaderName::from_static("x-request-id");

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(compression)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Claim the single operation slot, or report that one is already running.
pub(crate) fn acquire_operation(state: &AppState) -> Result<OwnedSemaphorePermit, AppError> {
    state
        .operation_permit
        .clone()
        .try_acquire_owned()
        .map_err(|_| AppError::Conflict("Another backup or restore is in progress".into()))
}
