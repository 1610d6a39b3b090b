use axum::extract::{Query, State};
use axum::Json;

use crate::api::ApiError;
use crate::models::{LawRecord, SearchParams, SearchResponse};
use crate::state::AppState;

/// GET /api/laws?q= - title search in the government registry.
pub async fn search_laws(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse<LawRecord>>, ApiError> {
    let query = params.q.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::BadRequest("q is required".to_string()));
    }

    let results = state
        .registry
        .search(&query, state.config.registry.max_records)
        .await
        .map_err(ApiError::upstream)?;
    let message = results
        .is_empty()
        .then(|| "Geen wetten of regelingen gevonden.".to_string());

    Ok(Json(SearchResponse {
        ok: true,
        query,
        mode: "registry".to_string(),
        results,
        message,
    }))
}
