//! End-to-end tests for the audit pipeline
//!
//! These tests verify:
//! - What is recorded for mutating calls (path, id, redacted request, envelope)
//! - What is never recorded (reads, skip paths)
//! - That handlers and clients see bodies unchanged
//! - That storage is detached from the response

use axum::{
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::{from_fn, Next},
    response::Response,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tower::ServiceExt;

use vadmin_server::{
    api::ApiResponse,
    audit::{attach_caller, CallerIdentity},
    config::{AuditConfig, DEFAULT_MAX_BODY_BYTES},
};

mod helpers;

use helpers::*;

#[tokio::test]
async fn test_create_material_is_recorded_redacted() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/materials",
            r#"{"name":"x","password":"secret"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.method, "POST");
    assert_eq!(record.path, "/materials");
    assert_eq!(record.resource_id, None);
    assert_eq!(
        serde_json::from_str::<Value>(&record.request).unwrap(),
        json!({"name": "x", "password": "***"})
    );
    assert_eq!(record.description, "create material");
    assert_eq!(record.status_code, 200);
    assert_eq!(record.response_msg, "ok");
    assert_eq!(record.response, r#"{"id":1}"#);
    assert_eq!(record.user_id, 0);
    assert_eq!(record.username, "");
}

#[tokio::test]
async fn test_get_is_never_recorded() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(empty_request(Method::GET, "/api/v1/materials?page=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_bytes(response).await;

    recorder.expect_none().await;
}

#[tokio::test]
async fn test_delete_extracts_resource_id() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(empty_request(Method::DELETE, "/api/v1/materials/42"))
        .await
        .unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.method, "DELETE");
    assert_eq!(record.path, "/materials");
    assert_eq!(record.resource_id, Some(42));
    assert_eq!(record.request, "{}");
    assert_eq!(record.description, "delete material");
    assert_eq!(record.response_msg, "deleted");
    assert_eq!(record.response, "null");
}

#[tokio::test]
async fn test_query_params_are_recorded_with_body() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(json_request(
            Method::PUT,
            "/api/v1/materials/5?tag=a&tag=b&draft=1",
            r#"{"title":"new"}"#,
        ))
        .await
        .unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.resource_id, Some(5));
    assert_eq!(
        serde_json::from_str::<Value>(&record.request).unwrap(),
        json!({"tag": ["a", "b"], "draft": "1", "title": "new"})
    );
    assert_eq!(record.response_msg, "updated");
    assert_eq!(record.response, r#"{"id":5}"#);
}

#[tokio::test]
async fn test_handler_and_client_see_identical_bytes() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);
    let payload = r#"{"name":"x","password":"secret","nested":{"k":[1,2,3]}}"#;

    let response = app(layer)
        .oneshot(json_request(Method::POST, "/api/v1/echo", payload))
        .await
        .unwrap();
    let received = body_bytes(response).await;
    assert_eq!(received, payload.as_bytes());

    let record = recorder.next_record().await;
    // not an envelope, so the body is kept verbatim
    assert_eq!(record.response_msg, "");
    assert_eq!(record.response, payload);
    let request: Value = serde_json::from_str(&record.request).unwrap();
    assert_eq!(request["password"], "***");
    assert_eq!(request["nested"], json!({"k": [1, 2, 3]}));
}

#[tokio::test]
async fn test_form_body_is_redacted() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);
    let payload = "username=admin&password=hunter2&token=abc";

    let response = app(layer)
        .oneshot(form_request("/api/v1/echo", payload))
        .await
        .unwrap();
    assert_eq!(body_bytes(response).await, payload.as_bytes());

    let record = recorder.next_record().await;
    assert_eq!(
        serde_json::from_str::<Value>(&record.request).unwrap(),
        json!({"username": "admin", "password": "***", "token": "***"})
    );
}

#[tokio::test]
async fn test_oversized_body_is_forwarded_but_not_decoded() {
    let config = AuditConfig {
        max_body_bytes: 1024,
        ..Default::default()
    };
    let (layer, mut recorder) = recording_layer(&config, Duration::ZERO);
    let payload = format!(r#"{{"password":"secret","blob":"{}"}}"#, "a".repeat(2048));

    let response = app(layer)
        .oneshot(json_request(Method::POST, "/api/v1/echo", &payload))
        .await
        .unwrap();
    assert_eq!(body_bytes(response).await, payload.as_bytes());

    let record = recorder.next_record().await;
    assert_eq!(record.request, "{}");
    assert!(!record.request.contains("secret"));
    // the response copy is bounded by the same cap
    assert_eq!(record.response.len(), 1024);
}

#[tokio::test]
async fn test_invalid_json_body_kept_as_text() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(json_request(Method::POST, "/api/v1/echo", "{not json"))
        .await
        .unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(
        serde_json::from_str::<Value>(&record.request).unwrap(),
        json!({"body": "{not json"})
    );
}

#[tokio::test]
async fn test_skip_path_is_never_recorded() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(empty_request(Method::POST, "/api/v1/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    body_bytes(response).await;

    recorder.expect_none().await;
}

#[tokio::test]
async fn test_configured_skip_path_and_keys() {
    let config = AuditConfig {
        skip_paths: vec!["/health".to_string(), "/plain".to_string()],
        sensitive_keys: vec!["pin".to_string()],
        ..Default::default()
    };
    let (layer, mut recorder) = recording_layer(&config, Duration::ZERO);
    let app = app(layer);

    let response = app
        .clone()
        .oneshot(empty_request(Method::POST, "/api/v1/plain"))
        .await
        .unwrap();
    body_bytes(response).await;
    recorder.expect_none().await;

    let response = app
        .oneshot(json_request(Method::POST, "/api/v1/echo", r#"{"pin":"1234","password":"x"}"#))
        .await
        .unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(
        serde_json::from_str::<Value>(&record.request).unwrap(),
        json!({"pin": "***", "password": "x"})
    );
}

#[tokio::test]
async fn test_plain_response_stored_raw() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(empty_request(Method::POST, "/api/v1/plain"))
        .await
        .unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.response_msg, "");
    assert_eq!(record.response, "plain text");
    assert_eq!(record.description, "create plain");
}

#[tokio::test]
async fn test_elapsed_reflects_handler_time() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(empty_request(Method::POST, "/api/v1/slow"))
        .await
        .unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    let elapsed: f64 = record.elapsed_ms.parse().unwrap();
    assert!(elapsed >= 50.0, "elapsed {elapsed} below handler time");
    assert!(elapsed < 1000.0, "elapsed {elapsed} unexpectedly large");
    let decimals = record.elapsed_ms.split('.').nth(1).unwrap();
    assert_eq!(decimals.len(), 2);
}

#[tokio::test]
async fn test_slow_sink_does_not_delay_response() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::from_millis(500));

    let started = Instant::now();
    let response = app(layer)
        .oneshot(json_request(Method::POST, "/api/v1/materials", r#"{"name":"x"}"#))
        .await
        .unwrap();
    body_bytes(response).await;
    assert!(started.elapsed() < Duration::from_millis(400));

    let record = recorder.next_record().await;
    assert_eq!(record.path, "/materials");
    // persistence time is not part of the measured latency
    assert!(record.elapsed_ms.parse::<f64>().unwrap() < 400.0);
}

#[tokio::test]
async fn test_failing_sink_does_not_affect_response() {
    let layer = layer_with_sink(Arc::new(FailingSink));

    let response = app(layer)
        .oneshot(json_request(Method::POST, "/api/v1/materials", r#"{"name":"x"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["msg"], "ok");
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_panicking_sink_does_not_affect_response() {
    let layer = layer_with_sink(Arc::new(PanickingSink));

    let response = app(layer)
        .oneshot(json_request(Method::POST, "/api/v1/materials", r#"{"name":"x"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_bytes(response).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_caller_attached_by_inner_auth_middleware() {
    async fn auth(mut request: Request, next: Next) -> Response {
        attach_caller(&mut request, CallerIdentity::new(7, "editor"));
        next.run(request).await
    }

    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);
    let business = Router::new()
        .route("/roles", post(|| async { ApiResponse::success(json!({"id": 3})) }))
        .layer(from_fn(auth));

    let response = app_with(layer, business)
        .oneshot(empty_request(Method::POST, "/api/v1/roles"))
        .await
        .unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.user_id, 7);
    assert_eq!(record.username, "editor");
    assert_eq!(record.description, "create role");
}

#[tokio::test]
async fn test_caller_from_outer_extension() {
    async fn outer_auth(mut request: Request, next: Next) -> Response {
        request.extensions_mut().insert(CallerIdentity::new(1, "admin"));
        next.run(request).await
    }

    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);
    let app = app(layer).layer(from_fn(outer_auth));

    let response = app
        .oneshot(empty_request(Method::DELETE, "/api/v1/materials/9"))
        .await
        .unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!((record.user_id, record.username.as_str()), (1, "admin"));
}

#[tokio::test]
async fn test_client_ip_and_platform_recorded() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let mut request = json_request(Method::POST, "/api/v1/materials", r#"{"name":"x"}"#);
    let headers = request.headers_mut();
    headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
    headers.insert(
        header::USER_AGENT,
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/120.0.0.0 Safari/537.36"
            .parse()
            .unwrap(),
    );

    let response = app(layer).oneshot(request).await.unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.ip, "203.0.113.7");
    assert_eq!(record.platform, "Windows Chrome 120");
}

#[tokio::test]
async fn test_error_status_is_recorded() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    // the Json extractor rejects a body that does not match the content type
    let response = app(layer)
        .oneshot(json_request(Method::POST, "/api/v1/materials", "[1,"))
        .await
        .unwrap();
    let status = response.status();
    assert!(status.is_client_error());
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.status_code, status.as_u16());
    assert_eq!(record.response_msg, "");
}

#[tokio::test]
async fn test_handler_error_status_and_msg_recorded() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(empty_request(Method::DELETE, "/api/v1/materials/0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.resource_id, Some(0));
    assert_eq!(record.status_code, 404);
    assert_eq!(record.response_msg, "material 0");
    assert_eq!(record.response, "null");
}

#[tokio::test]
async fn test_sensitive_query_params_are_redacted() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);

    let response = app(layer)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/materials?password=secret&token=t0k",
            r#"{"name":"x"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.path, "/materials");
    assert!(!record.request.contains("secret"));
    assert!(!record.request.contains("t0k"));
    assert_eq!(
        serde_json::from_str::<Value>(&record.request).unwrap(),
        json!({"password": "***", "token": "***", "name": "x"})
    );
}

#[tokio::test]
async fn test_form_body_with_many_keys_is_recorded() {
    const KEYS: usize = 50_000;
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);
    let payload = (0..KEYS).map(|i| format!("k{i}=v")).collect::<Vec<_>>().join("&");

    let record = tokio::time::timeout(Duration::from_secs(10), async {
        let response = app(layer)
            .oneshot(form_request("/api/v1/echo", &payload))
            .await
            .unwrap();
        assert_eq!(body_bytes(response).await.len(), payload.len());
        recorder.next_record().await
    })
    .await
    .expect("many-key form body took too long to record");

    let request: Value = serde_json::from_str(&record.request).unwrap();
    let fields = request.as_object().unwrap();
    assert_eq!(fields.len(), KEYS);
    assert_eq!(fields["k0"], "v");
    assert_eq!(fields[&format!("k{}", KEYS - 1)], "v");
}

/// JSON body of exactly `len` bytes carrying a sensitive field
fn sized_json_body(len: usize) -> String {
    let head = r#"{"password":"secret","blob":""#;
    let tail = r#""}"#;
    let body = format!("{head}{}{tail}", "a".repeat(len - head.len() - tail.len()));
    assert_eq!(body.len(), len);
    body
}

#[tokio::test]
async fn test_body_at_default_cap_is_decoded() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);
    let payload = sized_json_body(DEFAULT_MAX_BODY_BYTES);

    let response = app(layer)
        .oneshot(json_request(Method::POST, "/api/v1/plain", &payload))
        .await
        .unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    let request: Value = serde_json::from_str(&record.request).unwrap();
    assert_eq!(request["password"], "***");
    assert_eq!(request["blob"].as_str().map(str::len), Some(payload.len() - 31));
}

#[tokio::test]
async fn test_body_over_default_cap_is_not_decoded() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);
    let payload = sized_json_body(DEFAULT_MAX_BODY_BYTES + 1);

    let response = app(layer)
        .oneshot(json_request(Method::POST, "/api/v1/plain", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.request, "{}");
    assert_eq!(record.response, "plain text");
}

#[tokio::test]
async fn test_long_client_headers_recorded_in_full() {
    let (layer, mut recorder) = recording_layer(&AuditConfig::default(), Duration::ZERO);
    let forwarded = format!("{}.example", "h".repeat(57));
    let product = "c".repeat(300);

    let mut request = json_request(Method::POST, "/api/v1/materials", r#"{"name":"x"}"#);
    let headers = request.headers_mut();
    headers.insert("x-forwarded-for", forwarded.parse().unwrap());
    headers.insert(header::USER_AGENT, format!("{product}/1.0").parse().unwrap());

    let response = app(layer).oneshot(request).await.unwrap();
    body_bytes(response).await;

    let record = recorder.next_record().await;
    assert_eq!(record.ip.len(), 65);
    assert_eq!(record.ip, forwarded);
    assert_eq!(record.platform, format!("Unknown {product} 1"));
}
