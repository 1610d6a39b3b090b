use axum::extract::{Query, State};
use axum::Json;

use crate::api::ApiError;
use crate::models::{RetrievalMode, SearchHit, SearchParams, SearchResponse};
use crate::state::AppState;

/// GET /api/search?q= - the evidence the chat endpoint would use, without
/// answer generation.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse<SearchHit>>, ApiError> {
    let query = params.q.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::BadRequest("q is required".to_string()));
    }

    let retrieval = state
        .retriever
        .retrieve(&query)
        .await
        .map_err(ApiError::upstream)?;

    let mode = match retrieval.mode {
        RetrievalMode::Exact => "exact",
        RetrievalMode::Semantic => "semantic",
        RetrievalMode::None => "none",
    };
    let message = retrieval
        .hits
        .is_empty()
        .then(|| "Geen relevante wetsartikelen gevonden.".to_string());

    Ok(Json(SearchResponse {
        ok: true,
        query,
        mode: mode.to_string(),
        results: retrieval.hits,
        message,
    }))
}
