use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::api::{ApiError, ADMIN_TOKEN_HEADER};
use crate::ingest::IngestError;
use crate::models::{IngestRequest, IngestResponse};
use crate::state::AppState;

/// POST /api/ingest - fetch, segment, embed and store one law.
/// Disabled unless an ingest token is configured.
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let expected = state
        .config
        .ingest_token
        .as_deref()
        .ok_or(ApiError::Unauthorized)?;
    let given = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !constant_time_eq(given.as_bytes(), expected.as_bytes()) {
        return Err(ApiError::Unauthorized);
    }

    tracing::info!("Ingest requested for {}", req.bwb_id.trim());
    let response = state.ingestor.ingest(req).await.map_err(|e| match e {
        IngestError::InvalidRequest(msg) => ApiError::BadRequest(msg),
        IngestError::Segment(err) => ApiError::BadRequest(err.to_string()),
        IngestError::Upstream(err) => ApiError::upstream(err),
    })?;
    Ok(Json(response))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
