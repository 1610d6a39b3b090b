use axum::extract::State;
use axum::Json;
use tracing::Instrument;
use uuid::Uuid;

use crate::api::ApiError;
use crate::models::{ChatRequest, ChatResponse};
use crate::state::AppState;
use crate::synthesis::synthesize;

const MAX_CHAT_MESSAGE_LEN: usize = 2000;

/// POST /api/chat: retrieve evidence, then answer from it.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message is required".to_string()));
    }
    let message = truncate_to_char_boundary(message, MAX_CHAT_MESSAGE_LEN);
    let session = req
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    answer(&state, &message)
        .instrument(tracing::info_span!("chat", %session))
        .await
        .map(Json)
}

async fn answer(state: &AppState, message: &str) -> Result<ChatResponse, ApiError> {
    let retrieval = state
        .retriever
        .retrieve(message)
        .await
        .map_err(ApiError::upstream)?;
    tracing::info!(
        "Chat retrieval mode={:?} hits={} document={:?}",
        retrieval.mode,
        retrieval.hits.len(),
        retrieval.detection.as_ref().map(|d| d.document_id.as_str())
    );

    synthesize(state.completer.as_ref(), message, &retrieval.hits)
        .await
        .map_err(ApiError::upstream)
}

fn truncate_to_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    s.char_indices()
        .take_while(|(i, _)| *i < max_len)
        .map(|(_, c)| c)
        .collect()
}
