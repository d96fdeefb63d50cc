use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::models::snapshot::StoreName;

/// Failure reported by a storage port.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store {store} unavailable: {reason}")]
    Unavailable { store: String, reason: String },

    #[error("record {key} is corrupt: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Envelope-level decode failures. Both abort a restore before any write.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("artifact is not a valid JSON snapshot: {0}")]
    NotJson(String),

    #[error("artifact root is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed blob: {0}")]
    MalformedBlob(String),

    #[error("compression is unavailable")]
    CompressionUnavailable,

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to read store {store}: {source}")]
    StoreRead {
        store: StoreName,
        #[source]
        source: StoreError,
    },

    #[error("failed to write store {store}: {reason}")]
    StoreWrite { store: StoreName, reason: String },

    #[error("metadata reconciliation failed: {0}")]
    MetadataReconcile(String),

    #[error("flat store unavailable: {0}")]
    FlatStore(String),

    #[error("operation cancelled before any write")]
    Cancelled,

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
#[allow(dead_code)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".into()),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Snapshot(e) => (snapshot_status(e), e.to_string()),
            AppError::Store(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            AppError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Anyhow(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        tracing::error!(status = %status, error = %message);

        let body = json!({
            "data": null,
            "error": {
                "code": status.as_u16(),
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

fn snapshot_status(err: &SnapshotError) -> StatusCode {
    match err {
        SnapshotError::Decompression(_)
        | SnapshotError::Parse(_)
        | SnapshotError::MalformedBlob(_) => StatusCode::BAD_REQUEST,
        SnapshotError::Cancelled => StatusCode::CONFLICT,
        SnapshotError::FlatStore(_) | SnapshotError::StoreRead { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
