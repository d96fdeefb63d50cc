use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::services::restart::RESTORE_BOOT_MESSAGE;
use crate::services::restore_service::RestoreOrchestrator;
use crate::state::AppState;

use super::acquire_operation;

#[derive(Debug, Deserialize)]
pub struct RestoreQuery {
    /// Original artifact name; a `.gz` suffix selects decompression.
    pub filename: Option<String>,
}

pub async fn restore_backup(
    State(state): State<AppState>,
    Query(query): Query<RestoreQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let permit = acquire_operation(&state)?;

    if body.is_empty() {
        return Err(AppError::BadRequest("Backup artifact is empty".into()));
    }

    tracing::info!(
        filename = query.filename.as_deref().unwrap_or("<unnamed>"),
        bytes = body.len(),
        "Restore started"
    );

    // A client that disconnects drops this guard, which cancels the run if it
    // has not started writing yet.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let orchestrator = RestoreOrchestrator::new(
        state.flat.clone(),
        state.objects.clone(),
        state.config.stream_chunk_size,
    )
    .with_cancellation(cancel);

    let handle = tokio::spawn(async move {
        let _permit = permit;
        orchestrator.run(query.filename, body).await
    });
    let report = handle
        .await
        .map_err(|e| AppError::Internal(format!("Restore task failed: {}", e)))??;

    if report.restart_required {
        state.restart.request_restart(RESTORE_BOOT_MESSAGE);
    }

    let status = if report.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok((status, Json(json!({ "data": report, "error": null }))))
}
