use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    Json,
};
use service_core::error::AppError;

use crate::models::{CompletionRequest, CompletionResponse};
use crate::AppState;

/// `POST /v1/completions`.
///
/// A failed generation still answers 200: the diagnostic becomes the
/// completion text. Only an unreadable request body yields an error status.
pub async fn completions(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<CompletionResponse>, AppError> {
    let request: CompletionRequest = serde_json::from_slice(&body?)?;

    tracing::info!(
        prompt_len = request.prompt.len(),
        max_tokens = request.max_tokens,
        "Received completion request"
    );

    let text = match state.backend.execute(&request.prompt, &request.params()).await {
        Ok(generated) => generated.text,
        Err(e) => {
            tracing::error!(
                backend = state.backend.name(),
                error = %e,
                "Error running inference"
            );
            e.to_string()
        }
    };

    Ok(Json(CompletionResponse::new(
        &request.prompt,
        text,
        request.max_tokens,
    )))
}
