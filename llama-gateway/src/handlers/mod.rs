//! HTTP handlers for the gateway.

pub mod chat;
pub mod completions;
pub mod status;

use service_core::error::AppError;

pub use chat::chat;
pub use completions::completions;
pub use status::status;

/// Fallback for unknown paths and unsupported methods.
pub async fn not_found() -> AppError {
    AppError::not_found()
}
