//! Inference bridge: one prompt in, one block of generated text out.
//!
//! Backends sit behind the [`InferenceBackend`] trait so handlers never care
//! whether the model runs as a `llama-cli` subprocess or inside this process.

pub mod embedded;
#[cfg(feature = "llama-cpp")]
pub mod llama_cpp;
pub mod subprocess;

pub use embedded::{EmbeddedBackend, ModelRuntime, RuntimeChoice, RuntimeCompletion, RuntimeError};
pub use subprocess::{PromptFile, SubprocessBackend};

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Below this wall-clock time a generation almost certainly ran on the CPU.
pub const ACCELERATION_THRESHOLD: Duration = Duration::from_secs(1);

/// Failure of a single backend call.
///
/// The display form is the diagnostic shown to API callers.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Error: {stderr}")]
    ExitFailure { code: Option<i32>, stderr: String },

    #[error("Error running llama-cli: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Error preparing prompt file: {0}")]
    PromptFile(#[source] std::io::Error),

    #[error("Error: backend did not finish within {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Runtime(String),
}

/// Sampling parameters for one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: i32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.1,
            top_p: 0.9,
        }
    }
}

/// Successful backend output.
#[derive(Debug, Clone)]
pub struct GeneratedText {
    /// Trimmed generated text.
    pub text: String,
    /// Wall-clock duration of the backend call.
    pub elapsed: Duration,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Run one generation. Every failure comes back as a [`BridgeError`].
    async fn execute(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedText, BridgeError>;
}

/// Await `fut`, bounded by `timeout` when one is configured.
pub(crate) async fn with_timeout<F, T>(timeout: Option<Duration>, fut: F) -> Result<T, BridgeError>
where
    F: Future<Output = T>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| BridgeError::Timeout(limit)),
        None => Ok(fut.await),
    }
}

/// Log the latency of a finished generation, flagging suspiciously fast runs.
pub(crate) fn log_inference_time(backend: &str, elapsed: Duration) {
    tracing::info!(
        backend,
        elapsed_secs = elapsed.as_secs_f64(),
        "Inference completed in {:.2} seconds",
        elapsed.as_secs_f64()
    );

    if elapsed < ACCELERATION_THRESHOLD {
        tracing::warn!(
            backend,
            "Inference completed too quickly, might not be using GPU"
        );
    }
}
