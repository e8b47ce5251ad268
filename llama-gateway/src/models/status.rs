use serde::Serialize;

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub model: String,
    /// Unix epoch seconds with sub-second precision.
    pub timestamp: f64,
    pub gpu_status: String,
}

impl StatusResponse {
    pub fn ready(model: String, gpu_status: String) -> Self {
        Self {
            status: "ready",
            model,
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            gpu_status,
        }
    }
}
