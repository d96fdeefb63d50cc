use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::file::{FileMetadataTree, LibraryState, FILES_STORE_KEY};
use crate::services::backup_service::store_counts;
use crate::services::migration::is_migrated;
use crate::state::AppState;

pub async fn health() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let counts = store_counts(state.flat.as_ref(), state.objects.as_ref()).await?;
    let migrated = is_migrated(state.flat.as_ref())?;

    // An unreadable tree is reported, not fatal; reconcile repairs it.
    let library_state = state
        .flat
        .get(FILES_STORE_KEY)?
        .and_then(|raw| FileMetadataTree::from_json(&raw).ok())
        .map(|tree| tree.state.library_state)
        .unwrap_or(LibraryState::Uninitialized);

    let uptime = chrono::Utc::now()
        .signed_duration_since(state.start_time)
        .num_seconds();

    Ok(Json(json!({
        "data": {
            "flat_keys": counts.flat_keys,
            "records": counts.records,
            "library_state": library_state,
            "uuid_migrated": migrated,
            "operation_in_progress": state.operation_permit.available_permits() == 0,
            "uptime_seconds": uptime,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "error": null
    })))
}
