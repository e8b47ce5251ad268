mod common;

use axum::http::{Method, StatusCode};
use common::{
    assert_cors_headers, body_bytes, body_json, router, send, test_config, StubBackend,
    MISSING_PROBE,
};
use llama_gateway::config::{BackendKind, GatewayVariant};
use llama_gateway::startup::Application;

#[tokio::test]
async fn status_reports_ready_even_without_gpu_probe() {
    let app = router(
        test_config(GatewayVariant::Completions, BackendKind::Subprocess),
        StubBackend::replying("unused"),
    );

    let response = send(app, Method::GET, "/status", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_cors_headers(&response);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["model"], "mistral-7b-instruct-v0.2.Q4_0.gguf");
    assert!(body["timestamp"].as_f64().unwrap() > 0.0);
    assert!(body["gpu_status"]
        .as_str()
        .unwrap()
        .starts_with(&format!("{} error:", MISSING_PROBE)));
}

#[tokio::test]
async fn options_preflight_is_empty_200_on_any_path() {
    for path in ["/status", "/v1/completions", "/chat", "/does/not/exist"] {
        let app = router(
            test_config(GatewayVariant::Completions, BackendKind::Subprocess),
            StubBackend::replying("unused"),
        );

        let response = send(app, Method::OPTIONS, path, None).await;

        assert_eq!(response.status(), StatusCode::OK, "path {}", path);
        assert_cors_headers(&response);
        assert!(body_bytes(response).await.is_empty());
    }
}

#[tokio::test]
async fn unknown_path_is_json_404() {
    let app = router(
        test_config(GatewayVariant::Chat, BackendKind::Embedded),
        StubBackend::replying("unused"),
    );

    let response = send(app, Method::GET, "/v1/models", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_cors_headers(&response);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "error": "Not found" })
    );
}

#[tokio::test]
async fn request_id_is_propagated() {
    let app = router(
        test_config(GatewayVariant::Completions, BackendKind::Subprocess),
        StubBackend::replying("unused"),
    );

    let request = axum::http::Request::builder()
        .uri("/status")
        .header("x-request-id", "req-42")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn served_application_answers_over_tcp() {
    let app = Application::build_with_backend(
        test_config(GatewayVariant::Completions, BackendKind::Subprocess),
        StubBackend::replying("hi there"),
    )
    .await
    .expect("Failed to build application");
    let port = app.port();
    tokio::spawn(app.run_until_stopped());

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let status = client
        .get(format!("{}/status", base))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(status.status().as_u16(), 200);

    let completion: serde_json::Value = client
        .post(format!("{}/v1/completions", base))
        .json(&serde_json::json!({ "prompt": "Say hi", "max_tokens": 5 }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();
    assert_eq!(completion["choices"][0]["text"], "hi there");
    assert_eq!(completion["usage"]["total_tokens"], 4);
}

#[tokio::test]
async fn only_get_is_routed_for_status() {
    for method in [Method::HEAD, Method::POST, Method::PUT, Method::DELETE] {
        let app = router(
            test_config(GatewayVariant::Completions, BackendKind::Subprocess),
            StubBackend::replying("unused"),
        );

        let response = send(app, method.clone(), "/status", None).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND, "method {}", method);
        assert_cors_headers(&response);
    }
}
