use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use crate::codec::gzip::compress_stream;
use crate::error::AppError;
use crate::services::backup_service::{build_snapshot, plan_artifact, serialize_snapshot};
use crate::state::AppState;

use super::acquire_operation;

/// Header listing stores that could not be read and are empty in the artifact.
pub const DEGRADED_STORES_HEADER: &str = "X-Backup-Degraded-Stores";

pub async fn download_backup(State(state): State<AppState>) -> Result<Response, AppError> {
    let permit = acquire_operation(&state)?;

    let outcome = build_snapshot(state.flat.as_ref(), state.objects.as_ref()).await?;
    let json = serialize_snapshot(&outcome.snapshot)?;
    let plan = plan_artifact(
        &state.config.product_name,
        &outcome.snapshot.timestamp,
        state.config.backup_compression,
        state.config.compression_level,
    );
    drop(outcome.snapshot);

    let body = match plan.compressor {
        Some(compressor) => {
            let chunk_size = state.config.stream_chunk_size.max(1);
            let (writer, reader) = tokio::io::duplex(chunk_size);
            // The permit rides along until the last compressed byte is handed off.
            tokio::spawn(async move {
                let _permit = permit;
                let source = std::io::Cursor::new(json);
                match compress_stream(compressor, source, writer, chunk_size).await {
                    Ok(stats) => tracing::info!(
                        bytes_in = stats.bytes_in,
                        bytes_out = stats.bytes_out,
                        "Backup streamed"
                    ),
                    Err(e) => tracing::error!(error = %e, "Backup stream aborted"),
                }
            });
            Body::from_stream(ReaderStream::new(reader))
        }
        None => {
            drop(permit);
            tracing::info!(bytes = json.len(), "Backup served uncompressed");
            Body::from(json)
        }
    };

    let degraded = outcome
        .degraded_stores
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, plan.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", plan.filename),
        )
        .header(DEGRADED_STORES_HEADER, degraded)
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}
