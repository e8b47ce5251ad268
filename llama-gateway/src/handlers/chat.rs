use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    Json,
};
use service_core::error::AppError;

use crate::models::{ChatRequest, ChatResponse};
use crate::AppState;

/// `POST /chat`. Backend failures surface as 500 `{error}`.
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let request: ChatRequest = serde_json::from_slice(&body?)?;

    tracing::info!(message_len = request.message.len(), "Received chat request");

    let generated = state
        .backend
        .execute(&request.message, &request.params())
        .await
        .map_err(|e| AppError::Backend(e.to_string()))?;

    Ok(Json(ChatResponse {
        response: generated.text,
    }))
}
