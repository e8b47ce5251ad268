#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use llama_gateway::config::{
    BackendConfig, BackendKind, DiagnosticsConfig, GatewayConfig, GatewayVariant,
};
use llama_gateway::services::bridge::{
    BridgeError, EmbeddedBackend, GeneratedText, GenerationParams, InferenceBackend, ModelRuntime,
    RuntimeChoice, RuntimeCompletion, RuntimeError,
};
use llama_gateway::startup::{build_router, AppState};
use service_core::config::Config;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const MISSING_PROBE: &str = "llama-gateway-test-missing-gpu-probe";

pub fn test_config(variant: GatewayVariant, kind: BackendKind) -> GatewayConfig {
    GatewayConfig {
        common: Config {
            host: "127.0.0.1".to_string(),
            port: Some(0),
        },
        variant,
        backend: BackendConfig {
            kind,
            model_path: PathBuf::from("/models/mistral-7b-instruct-v0.2.Q4_0.gguf"),
            cli_path: None,
            timeout: None,
            cuda_visible_devices: None,
            n_gpu_layers: None,
        },
        diagnostics: DiagnosticsConfig {
            gpu_probe_command: MISSING_PROBE.to_string(),
            startup_self_test: false,
        },
        body_limit_bytes: 1024 * 1024,
    }
}

/// Backend returning a canned result and recording every call.
pub struct StubBackend {
    result: Result<String, String>,
    calls: Mutex<Vec<(String, GenerationParams)>>,
}

impl StubBackend {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(stderr: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(stderr.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, GenerationParams)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn execute(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedText, BridgeError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), *params));

        match &self.result {
            Ok(text) => Ok(GeneratedText {
                text: text.clone(),
                elapsed: Duration::from_millis(1500),
            }),
            Err(stderr) => Err(BridgeError::ExitFailure {
                code: Some(1),
                stderr: stderr.clone(),
            }),
        }
    }
}

/// Embedded runtime that always raises the given error.
pub struct FailingRuntime(pub &'static str);

impl ModelRuntime for FailingRuntime {
    fn create_completion(
        &mut self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<RuntimeCompletion, RuntimeError> {
        Err(RuntimeError::new(self.0))
    }
}

/// Embedded runtime that answers with a fixed reply.
pub struct ReplyRuntime(pub &'static str);

impl ModelRuntime for ReplyRuntime {
    fn create_completion(
        &mut self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<RuntimeCompletion, RuntimeError> {
        Ok(RuntimeCompletion {
            choices: vec![RuntimeChoice {
                text: format!("\n{}\n", self.0),
            }],
        })
    }
}

pub fn embedded<R: ModelRuntime>(runtime: R) -> Arc<dyn InferenceBackend> {
    Arc::new(EmbeddedBackend::new(runtime))
}

pub fn router(config: GatewayConfig, backend: Arc<dyn InferenceBackend>) -> Router {
    build_router(AppState::new(config, backend))
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("response body is not JSON")
}

pub fn assert_cors_headers(response: &Response<Body>) {
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type, Accept");
    assert_eq!(headers["access-control-max-age"], "86400");
}

/// Write an executable shell script standing in for `llama-cli`.
#[cfg(unix)]
pub fn write_script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path
}
