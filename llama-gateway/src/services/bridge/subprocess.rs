//! `llama-cli` subprocess backend.

use super::{log_inference_time, with_timeout, BridgeError, GeneratedText, GenerationParams, InferenceBackend};
use crate::config::BackendConfig;
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tokio::process::Command;

/// Context window passed to every invocation.
pub const CONTEXT_SIZE: u32 = 8192;

/// Offload every compatible layer to the GPU.
pub const ALL_GPU_LAYERS: &str = "-1";

pub const REPEAT_PENALTY: &str = "1.2";

pub const EMPTY_OUTPUT_PLACEHOLDER: &str =
    "No output was generated. This could mean the model failed to process the prompt correctly.";

/// Temporary file holding the prompt for one invocation.
///
/// The file is removed when the guard is dropped, whichever way the request
/// ends.
#[derive(Debug)]
pub struct PromptFile {
    path: TempPath,
}

impl PromptFile {
    pub fn create(prompt: &str) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("prompt_")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(prompt.as_bytes())?;
        file.flush()?;

        // Close our handle so the child is the only reader.
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    cli_path: PathBuf,
    model_path: PathBuf,
    timeout: Option<Duration>,
    cuda_visible_devices: Option<String>,
}

impl SubprocessBackend {
    pub fn new(cli_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            cli_path: cli_path.into(),
            model_path: model_path.into(),
            timeout: None,
            cuda_visible_devices: None,
        }
    }

    /// Build from configuration; `cli_path` must be set.
    pub fn from_config(config: &BackendConfig) -> Option<Self> {
        let cli_path = config.cli_path.clone()?;
        Some(Self {
            cli_path,
            model_path: config.model_path.clone(),
            timeout: config.timeout,
            cuda_visible_devices: config.cuda_visible_devices.clone(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cuda_visible_devices(mut self, devices: impl Into<String>) -> Self {
        self.cuda_visible_devices = Some(devices.into());
        self
    }

    /// Arguments for one raw-mode generation reading the prompt from `prompt_file`.
    pub fn command_args(&self, prompt_file: &Path, params: &GenerationParams) -> Vec<OsString> {
        vec![
            "--model".into(),
            self.model_path.clone().into_os_string(),
            "--file".into(),
            prompt_file.as_os_str().to_owned(),
            "--n-predict".into(),
            params.max_tokens.to_string().into(),
            "--ctx-size".into(),
            CONTEXT_SIZE.to_string().into(),
            "--n-gpu-layers".into(),
            ALL_GPU_LAYERS.into(),
            "--temp".into(),
            params.temperature.to_string().into(),
            "--top-p".into(),
            params.top_p.to_string().into(),
            "--repeat-penalty".into(),
            REPEAT_PENALTY.into(),
            "--no-chat".into(),
            "--silent-prompt".into(),
            // Prints offload details to stderr.
            "--verbose-prompt".into(),
        ]
    }
}

#[async_trait]
impl InferenceBackend for SubprocessBackend {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn execute(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedText, BridgeError> {
        let prompt_file = PromptFile::create(prompt).map_err(BridgeError::PromptFile)?;

        let mut command = Command::new(&self.cli_path);
        command
            .args(self.command_args(prompt_file.path(), params))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(devices) = &self.cuda_visible_devices {
            command.env("CUDA_VISIBLE_DEVICES", devices);
        }

        tracing::debug!(command = ?command.as_std(), "Running llama-cli");

        let start = Instant::now();
        let output = with_timeout(self.timeout, command.output())
            .await?
            .map_err(|e| {
                tracing::error!(error = %e, cli = %self.cli_path.display(), "Failed to spawn llama-cli");
                BridgeError::Spawn(e)
            })?;
        let elapsed = start.elapsed();

        log_inference_time(self.name(), elapsed);

        let text = classify_output(output)?;
        drop(prompt_file);

        Ok(GeneratedText { text, elapsed })
    }
}

/// Map a finished process to generated text or a failure.
fn classify_output(output: Output) -> Result<String, BridgeError> {
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        tracing::error!(
            code = ?output.status.code(),
            stderr = %stderr,
            "llama-cli exited with an error"
        );
        return Err(BridgeError::ExitFailure {
            code: output.status.code(),
            stderr: stderr.into_owned(),
        });
    }

    tracing::debug!(stderr = %stderr, "llama-cli stderr");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = stdout.trim();
    if text.is_empty() {
        tracing::warn!("Empty output from llama-cli");
        return Ok(EMPTY_OUTPUT_PLACEHOLDER.to_string());
    }

    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn command_args_use_fixed_generation_flags() {
        let backend = SubprocessBackend::new("/opt/llama/llama-cli", "/models/m.gguf");
        let params = GenerationParams {
            max_tokens: 256,
            temperature: 0.1,
            top_p: 0.9,
        };

        let args = args_as_strings(backend.command_args(Path::new("/tmp/prompt.txt"), &params));

        assert_eq!(
            args,
            vec![
                "--model",
                "/models/m.gguf",
                "--file",
                "/tmp/prompt.txt",
                "--n-predict",
                "256",
                "--ctx-size",
                "8192",
                "--n-gpu-layers",
                "-1",
                "--temp",
                "0.1",
                "--top-p",
                "0.9",
                "--repeat-penalty",
                "1.2",
                "--no-chat",
                "--silent-prompt",
                "--verbose-prompt",
            ]
        );
    }

    #[test]
    fn negative_max_tokens_passes_through() {
        let backend = SubprocessBackend::new("/opt/llama/llama-cli", "/models/m.gguf");
        let params = GenerationParams {
            max_tokens: -1,
            ..GenerationParams::default()
        };

        let args = args_as_strings(backend.command_args(Path::new("/tmp/prompt.txt"), &params));
        let index = args.iter().position(|a| a == "--n-predict").unwrap();
        assert_eq!(args[index + 1], "-1");
    }

    #[test]
    fn prompt_file_is_removed_on_drop() {
        let prompt_file = PromptFile::create("Summarize this email").unwrap();
        let path = prompt_file.path().to_path_buf();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Summarize this email");

        drop(prompt_file);
        assert!(!path.exists());
    }

    #[test]
    fn from_config_requires_cli_path() {
        let config = BackendConfig {
            kind: crate::config::BackendKind::Subprocess,
            model_path: PathBuf::from("/models/m.gguf"),
            cli_path: None,
            timeout: None,
            cuda_visible_devices: None,
            n_gpu_layers: None,
        };
        assert!(SubprocessBackend::from_config(&config).is_none());

        let config = BackendConfig {
            cli_path: Some(PathBuf::from("/opt/llama/llama-cli")),
            timeout: Some(Duration::from_secs(5)),
            ..config
        };
        let backend = SubprocessBackend::from_config(&config).unwrap();
        assert_eq!(backend.timeout, Some(Duration::from_secs(5)));
    }
}
