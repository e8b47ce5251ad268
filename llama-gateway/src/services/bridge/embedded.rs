//! In-process model runtime backend.

use super::{log_inference_time, with_timeout, BridgeError, GeneratedText, GenerationParams, InferenceBackend};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error raised by a model runtime. Its message is passed to callers verbatim.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RuntimeError(pub String);

impl RuntimeError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeChoice {
    pub text: String,
}

/// Result of one runtime call, shaped like a completion response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeCompletion {
    pub choices: Vec<RuntimeChoice>,
}

/// A loaded model that can produce completions.
///
/// Implementations are not required to be reentrant; the backend serializes
/// every call.
pub trait ModelRuntime: Send + 'static {
    fn create_completion(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<RuntimeCompletion, RuntimeError>;
}

/// Runs a [`ModelRuntime`] on the blocking pool, one call at a time.
pub struct EmbeddedBackend<R> {
    runtime: Arc<Mutex<R>>,
    timeout: Option<Duration>,
}

impl<R: ModelRuntime> EmbeddedBackend<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime: Arc::new(Mutex::new(runtime)),
            timeout: None,
        }
    }

    /// Bound how long a request waits for the runtime. The call itself keeps
    /// running to completion and holds the runtime until it does.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<R: ModelRuntime> InferenceBackend for EmbeddedBackend<R> {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn execute(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedText, BridgeError> {
        let runtime = Arc::clone(&self.runtime);
        let prompt = prompt.to_owned();
        let params = *params;

        let start = Instant::now();
        let task = tokio::task::spawn_blocking(move || {
            let mut runtime = runtime
                .lock()
                .map_err(|_| BridgeError::Runtime("Model runtime is unavailable".to_string()))?;
            runtime
                .create_completion(&prompt, &params)
                .map_err(|e| BridgeError::Runtime(e.to_string()))
        });

        let completion = with_timeout(self.timeout, task)
            .await?
            .map_err(|e| BridgeError::Runtime(format!("Inference task failed: {}", e)))?
            .inspect_err(|e| tracing::error!(error = %e, "Model runtime call failed"))?;
        let elapsed = start.elapsed();

        log_inference_time(self.name(), elapsed);

        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text.trim().to_string())
            .ok_or_else(|| BridgeError::Runtime("Model returned no completions".to_string()))?;

        Ok(GeneratedText { text, elapsed })
    }
}
