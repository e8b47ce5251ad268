//! Best-effort accelerator diagnostics.
//!
//! Nothing here can fail a request or abort startup: every problem is turned
//! into a descriptive string or a log line.

use crate::services::bridge::{GenerationParams, InferenceBackend, ACCELERATION_THRESHOLD};
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Line of `nvidia-smi` output that names the first GPU.
const GPU_SUMMARY_LINE: usize = 7;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub const SELF_TEST_PROMPT: &str = "Hello, this is a test.";
pub const SELF_TEST_MAX_TOKENS: i32 = 10;

/// Characters of self-test output shown in the startup log.
const SELF_TEST_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct GpuProbe {
    command: String,
}

enum ProbeOutcome {
    Detected(String),
    Failed,
    Error(String),
}

impl GpuProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// One-line accelerator status for `/status`.
    pub async fn gpu_status(&self) -> String {
        match self.run().await {
            ProbeOutcome::Detected(stdout) => summarize_gpu_output(&stdout),
            ProbeOutcome::Failed => format!("{} failed", self.command),
            ProbeOutcome::Error(e) => format!("{} error: {}", self.command, e),
        }
    }

    /// Log the full probe output at startup.
    pub async fn log_startup_gpu_info(&self) {
        match self.run().await {
            ProbeOutcome::Detected(stdout) => {
                tracing::info!(probe = %self.command, "GPU Info:\n{}", stdout);
            }
            ProbeOutcome::Failed => {
                tracing::warn!(
                    probe = %self.command,
                    "{} failed, GPU may not be available",
                    self.command
                );
            }
            ProbeOutcome::Error(e) => {
                tracing::warn!(
                    probe = %self.command,
                    error = %e,
                    "{} not found, GPU may not be available",
                    self.command
                );
            }
        }
    }

    async fn run(&self) -> ProbeOutcome {
        let output = Command::new(&self.command).kill_on_drop(true).output();

        match tokio::time::timeout(PROBE_TIMEOUT, output).await {
            Ok(Ok(output)) if output.status.success() => {
                ProbeOutcome::Detected(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Ok(_)) => ProbeOutcome::Failed,
            Ok(Err(e)) => ProbeOutcome::Error(e.to_string()),
            Err(_) => ProbeOutcome::Error(format!(
                "timed out after {} seconds",
                PROBE_TIMEOUT.as_secs()
            )),
        }
    }
}

/// Pick the GPU summary line out of `nvidia-smi` output.
///
/// Falls back to the first non-blank line for shorter or unfamiliar output.
pub fn summarize_gpu_output(stdout: &str) -> String {
    let lines: Vec<&str> = stdout.lines().collect();
    let line = lines
        .get(GPU_SUMMARY_LINE)
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .or_else(|| lines.iter().map(|line| line.trim()).find(|line| !line.is_empty()));

    match line {
        Some(line) => format!("GPU detected: {}", line),
        None => "GPU detected".to_string(),
    }
}

/// Run one short generation and log how long it took.
///
/// Informational only; the result never gates readiness.
pub async fn startup_self_test(backend: &dyn InferenceBackend) -> Option<Duration> {
    tracing::info!(backend = backend.name(), "Testing model with a simple prompt...");

    let params = GenerationParams {
        max_tokens: SELF_TEST_MAX_TOKENS,
        ..GenerationParams::default()
    };

    let start = Instant::now();
    let result = backend.execute(SELF_TEST_PROMPT, &params).await;
    let elapsed = start.elapsed();

    match result {
        Ok(generated) => {
            let preview: String = generated.text.chars().take(SELF_TEST_PREVIEW_CHARS).collect();
            tracing::info!(
                elapsed_secs = elapsed.as_secs_f64(),
                output = %preview,
                "Test completed in {:.2} seconds",
                elapsed.as_secs_f64()
            );

            if elapsed < ACCELERATION_THRESHOLD {
                tracing::warn!("Test completed too quickly, might not be using GPU");
            }

            Some(elapsed)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Test failed");
            None
        }
    }
}
