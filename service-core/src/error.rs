use axum::{
    Json,
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Malformed request: {0}")]
    MalformedRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedRequest(anyhow::Error::new(err))
    }
}

/// Body buffering failures, such as exceeding the body limit, are request errors.
impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        AppError::MalformedRequest(anyhow::anyhow!(rejection.body_text()))
    }
}

impl AppError {
    pub fn not_found() -> Self {
        AppError::NotFound(anyhow::anyhow!("Not found"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MalformedRequest(_)
            | AppError::Backend(_)
            | AppError::InternalError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let status = self.status_code();
        // Callers see the underlying cause, not the variant prefix.
        let error = match self {
            AppError::MalformedRequest(err)
            | AppError::NotFound(err)
            | AppError::InternalError(err)
            | AppError::ConfigError(err) => err.to_string(),
            AppError::Backend(msg) => msg,
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %error, "Request failed");
        }

        (status, Json(ErrorResponse { error })).into_response()
    }
}
