use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Request bodies up to 50 MiB are accepted by default.
const DEFAULT_BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;

const DEFAULT_GPU_PROBE_COMMAND: &str = "nvidia-smi";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub common: core_config::Config,
    pub variant: GatewayVariant,
    pub backend: BackendConfig,
    pub diagnostics: DiagnosticsConfig,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Model file (GGUF) handed to the backend.
    pub model_path: PathBuf,
    /// `llama-cli` executable; required for the subprocess backend.
    pub cli_path: Option<PathBuf>,
    /// Upper bound on a single backend call.
    pub timeout: Option<Duration>,
    /// Forwarded to the child process as `CUDA_VISIBLE_DEVICES`.
    pub cuda_visible_devices: Option<String>,
    /// Layers offloaded by the embedded runtime; `None` offloads all of them.
    pub n_gpu_layers: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub gpu_probe_command: String,
    pub startup_self_test: bool,
}

/// Which HTTP surface the gateway exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayVariant {
    /// `POST /v1/completions`, OpenAI-style response.
    Completions,
    /// `POST /chat`, `{response}` body.
    Chat,
}

/// How the model is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Subprocess,
    Embedded,
}

impl GatewayVariant {
    pub fn default_port(self) -> u16 {
        match self {
            GatewayVariant::Completions => 8000,
            GatewayVariant::Chat => 5005,
        }
    }

    pub fn default_backend(self) -> BackendKind {
        match self {
            GatewayVariant::Completions => BackendKind::Subprocess,
            GatewayVariant::Chat => BackendKind::Embedded,
        }
    }
}

impl FromStr for GatewayVariant {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completions" | "completion" => Ok(GatewayVariant::Completions),
            "chat" => Ok(GatewayVariant::Chat),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown gateway variant '{}', expected 'completions' or 'chat'",
                other
            ))),
        }
    }
}

impl fmt::Display for GatewayVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayVariant::Completions => f.write_str("completions"),
            GatewayVariant::Chat => f.write_str("chat"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subprocess" | "cli" => Ok(BackendKind::Subprocess),
            "embedded" | "library" => Ok(BackendKind::Embedded),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown backend '{}', expected 'subprocess' or 'embedded'",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Subprocess => f.write_str("subprocess"),
            BackendKind::Embedded => f.write_str("embedded"),
        }
    }
}

impl GatewayConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let variant = match lookup("GATEWAY_VARIANT") {
            Some(value) => value.parse()?,
            None => GatewayVariant::Completions,
        };

        let kind = match lookup("LLAMA_BACKEND") {
            Some(value) => value.parse()?,
            None => variant.default_backend(),
        };

        let timeout = lookup("LLAMA_TIMEOUT_SECS")
            .map(|value| parse_value::<u64>("LLAMA_TIMEOUT_SECS", &value))
            .transpose()?
            .map(Duration::from_secs);

        let n_gpu_layers = lookup("LLAMA_N_GPU_LAYERS")
            .map(|value| parse_value::<u32>("LLAMA_N_GPU_LAYERS", &value))
            .transpose()?;

        let startup_self_test = lookup("GATEWAY_STARTUP_SELF_TEST")
            .map(|value| parse_value::<bool>("GATEWAY_STARTUP_SELF_TEST", &value))
            .transpose()?
            .unwrap_or(true);

        let body_limit_bytes = lookup("GATEWAY_BODY_LIMIT_BYTES")
            .map(|value| parse_value::<usize>("GATEWAY_BODY_LIMIT_BYTES", &value))
            .transpose()?
            .unwrap_or(DEFAULT_BODY_LIMIT_BYTES);

        Ok(GatewayConfig {
            common,
            variant,
            backend: BackendConfig {
                kind,
                model_path: PathBuf::from(require(&lookup, "LLAMA_MODEL_PATH")?),
                cli_path: lookup("LLAMA_CLI_PATH").map(PathBuf::from),
                timeout,
                cuda_visible_devices: lookup("LLAMA_CUDA_VISIBLE_DEVICES"),
                n_gpu_layers,
            },
            diagnostics: DiagnosticsConfig {
                gpu_probe_command: lookup("GPU_PROBE_COMMAND")
                    .unwrap_or_else(|| DEFAULT_GPU_PROBE_COMMAND.to_string()),
                startup_self_test,
            },
            body_limit_bytes,
        })
    }

    /// Fail fast when the model or the backend executable is missing.
    pub fn validate(&self) -> Result<(), AppError> {
        ensure_exists("Model", &self.backend.model_path)?;

        if self.backend.kind == BackendKind::Subprocess {
            let cli_path = self.backend.cli_path.as_deref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "LLAMA_CLI_PATH is required for the subprocess backend"
                ))
            })?;
            ensure_exists("llama-cli", cli_path)?;
        }

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.common.port_or(self.variant.default_port())
    }
}

impl BackendConfig {
    /// Model file name as reported by `/status`.
    pub fn model_name(&self) -> String {
        self.model_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.model_path.display().to_string())
    }
}

fn ensure_exists(what: &str, path: &Path) -> Result<(), AppError> {
    if path.exists() {
        Ok(())
    } else {
        Err(AppError::ConfigError(anyhow::anyhow!(
            "{} not found at {}",
            what,
            path.display()
        )))
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("{} is required but not set", key)))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, value, e))
    })
}
