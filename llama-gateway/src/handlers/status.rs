use axum::{extract::State, Json};

use crate::models::StatusResponse;
use crate::AppState;

/// `GET /status`. Always answers; probe failures land in `gpu_status`.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let gpu_status = state.gpu_probe.gpu_status().await;

    Json(StatusResponse::ready(
        state.config.backend.model_name(),
        gpu_status,
    ))
}
