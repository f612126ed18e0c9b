use agent::{
    Analyst, DEFAULT_PROBE_MODEL, GeminiProvider, InferenceProvider, PROBE_PROMPT, probe_inference,
};
use axum::{
    Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use proto::{InferenceError, RiskLevel};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const KEY: &str = "AIza-test-key-123456";

async fn spawn_gemini<F>(reply: F) -> String
where
    F: Fn(String, Value) -> Response + Clone + Send + Sync + 'static,
{
    let router = Router::new().route(
        "/v1beta/models/{model_action}",
        post(
            move |Path(model_action): Path<String>,
                  Query(query): Query<HashMap<String, String>>,
                  Json(body): Json<Value>| {
                let reply = reply.clone();
                async move {
                    if query.get("key").map(String::as_str) != Some(KEY) {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}})),
                        )
                            .into_response();
                    }
                    reply(model_action, body)
                }
            },
        ),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock gemini");
    });
    format!("http://{addr}")
}

fn text_reply(text: &str) -> Response {
    Json(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    }))
    .into_response()
}

#[tokio::test]
async fn healthy_key_reports_reply_text() {
    let url = spawn_gemini(|model_action, body| {
        assert_eq!(model_action, format!("{DEFAULT_PROBE_MODEL}:generateContent"));
        assert_eq!(body["contents"][0]["parts"][0]["text"], PROBE_PROMPT);
        text_reply("OK")
    })
    .await;
    let provider = GeminiProvider::with_base_url(KEY, url);

    let report = probe_inference(&provider, DEFAULT_PROBE_MODEL, PROBE_TIMEOUT).await;
    assert!(report.success);
    assert_eq!(report.message, "OK");
    assert!(!report.should_reset_credential);
}

#[tokio::test]
async fn entity_not_found_requests_key_reset() {
    let url = spawn_gemini(|_, _| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}})),
        )
            .into_response()
    })
    .await;
    let provider = GeminiProvider::with_base_url(KEY, url);

    let report = probe_inference(&provider, DEFAULT_PROBE_MODEL, PROBE_TIMEOUT).await;
    assert!(!report.success);
    assert!(report.should_reset_credential);
    assert!(report.message.contains("404"));
}

#[tokio::test]
async fn rejected_key_requests_key_reset() {
    let url = spawn_gemini(|_, _| text_reply("unreachable")).await;
    let provider = GeminiProvider::with_base_url("AIza-wrong-key-000000", url);

    let report = probe_inference(&provider, DEFAULT_PROBE_MODEL, PROBE_TIMEOUT).await;
    assert!(!report.success);
    assert!(report.should_reset_credential);
    assert!(report.message.contains("not valid"));
}

#[tokio::test]
async fn missing_key_requests_key_without_calling_upstream() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let url = spawn_gemini(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        text_reply("OK")
    })
    .await;
    let provider = GeminiProvider::with_base_url("", url);
    assert!(!provider.has_key());

    let report = probe_inference(&provider, DEFAULT_PROBE_MODEL, PROBE_TIMEOUT).await;
    assert!(!report.success);
    assert!(report.should_reset_credential);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn server_error_passes_through_without_reset() {
    let url = spawn_gemini(|_, _| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}})),
        )
            .into_response()
    })
    .await;
    let provider = GeminiProvider::with_base_url(KEY, url);

    let report = probe_inference(&provider, DEFAULT_PROBE_MODEL, PROBE_TIMEOUT).await;
    assert!(!report.success);
    assert!(!report.should_reset_credential);
    assert!(report.message.contains("overloaded"));
}

#[tokio::test]
async fn rate_limit_passes_through_without_reset() {
    let url = spawn_gemini(|_, _| StatusCode::TOO_MANY_REQUESTS.into_response()).await;
    let provider = GeminiProvider::with_base_url(KEY, url);

    let report = probe_inference(&provider, DEFAULT_PROBE_MODEL, PROBE_TIMEOUT).await;
    assert_eq!(report.message, "Rate limit exceeded");
    assert!(!report.should_reset_credential);
}

#[tokio::test]
async fn slow_upstream_times_out_without_reset() {
    let router = Router::new().route(
        "/v1beta/models/{model_action}",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            text_reply("late")
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock gemini");
    });
    let provider = GeminiProvider::with_base_url(KEY, url);

    let started = std::time::Instant::now();
    let report = probe_inference(&provider, DEFAULT_PROBE_MODEL, Duration::from_millis(200)).await;
    assert!(!report.success);
    assert!(!report.should_reset_credential);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn risk_analysis_sends_schema_and_parses_reply() {
    let url = spawn_gemini(|model_action, body| {
        assert!(model_action.starts_with("gemini-3-flash-preview"));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            body["generationConfig"]["responseSchema"]["required"],
            json!(["axes", "riskLevel", "summary", "recommendations"])
        );
        let reply = json!({
            "axes": {"chronicDegradation": 12, "irreversibleInflection": 55, "judgmentSovereignty": 30},
            "riskLevel": "MEDIUM",
            "summary": "Manageable",
            "recommendations": ["Monitor"]
        });
        text_reply(&reply.to_string())
    })
    .await;
    let analyst = Analyst::new(
        Arc::new(GeminiProvider::with_base_url(KEY, url)),
        PROBE_TIMEOUT,
    );

    let assessment = analyst.analyze_risk("Key hire leaving").await.expect("assessment");
    assert_eq!(assessment.risk_level, RiskLevel::Medium);
    assert_eq!(assessment.axes.irreversible_inflection, 55.0);
}

#[tokio::test]
async fn analysis_surfaces_not_found() {
    let url = spawn_gemini(|_, _| StatusCode::NOT_FOUND.into_response()).await;
    let analyst = Analyst::new(
        Arc::new(GeminiProvider::with_base_url(KEY, url)),
        PROBE_TIMEOUT,
    );
    assert!(matches!(
        analyst.analyze_global_resonance("Strait closure").await,
        Err(InferenceError::UpstreamNotFound(_))
    ));
}
