use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::services::maintenance_service;
use crate::services::reconcile::reconcile_metadata;
use crate::services::restart::{FORMAT_BOOT_MESSAGE, RESET_BOOT_MESSAGE};
use crate::state::AppState;

use super::acquire_operation;

pub async fn reconcile(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let _permit = acquire_operation(&state)?;
    let report = reconcile_metadata(state.flat.as_ref(), state.objects.as_ref()).await?;
    Ok(Json(json!({ "data": report, "error": null })))
}

pub async fn reset_settings(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let _permit = acquire_operation(&state)?;
    let report = maintenance_service::reset_settings(state.flat.as_ref())?;
    state.restart.request_restart(RESET_BOOT_MESSAGE);
    Ok(Json(json!({ "data": report, "error": null })))
}

pub async fn format_file_system(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let _permit = acquire_operation(&state)?;
    let report =
        maintenance_service::format_file_system(state.flat.as_ref(), state.objects.as_ref())
            .await?;
    state.restart.request_restart(FORMAT_BOOT_MESSAGE);
    Ok(Json(json!({ "data": report, "error": null })))
}
