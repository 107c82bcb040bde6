use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use poster_studio::{Credential, GeminiClient, PosterError, PosterGenerator, SelectedImage};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// What the mock service saw and what it should answer.
struct MockGemini {
    requests: Mutex<Vec<(Option<String>, Value)>>,
    status: StatusCode,
    body: String,
}

async fn generate_content(
    State(mock): State<Arc<MockGemini>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.requests.lock().unwrap().push((key, body));
    (mock.status, mock.body.clone())
}

/// Starts a mock Gemini endpoint and returns its base URL.
async fn serve(status: StatusCode, body: impl Into<String>) -> (String, Arc<MockGemini>) {
    let mock = Arc::new(MockGemini {
        requests: Mutex::new(Vec::new()),
        status,
        body: body.into(),
    });
    let app = Router::new()
        .route(
            "/v1beta/models/:model_action",
            post(generate_content),
        )
        .with_state(Arc::clone(&mock));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), mock)
}

fn client(base: &str) -> GeminiClient {
    GeminiClient::builder()
        .api_base(base)
        .model("gemini-2.5-flash-image")
        .api_key("test-key")
        .build()
}

fn photo() -> SelectedImage {
    SelectedImage::new(Some("photo.jpg".into()), Some("image/jpeg"), b"ABC".to_vec())
}

#[tokio::test]
async fn test_returns_first_image_part_after_text_part() {
    let (base, mock) = serve(
        StatusCode::OK,
        json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": "QUJD" } }
                    ]
                },
                "finishReason": "STOP"
            }]
        })
        .to_string(),
    )
    .await;

    let image = client(&base).generate("test prompt", &photo()).await.unwrap();
    assert_eq!(image.as_deref(), Some("QUJD"));

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (key, body) = &requests[0];
    assert_eq!(key.as_deref(), Some("test-key"));
    assert_eq!(
        body["contents"][0]["parts"],
        json!([
            { "text": "test prompt" },
            { "inlineData": { "mimeType": "image/jpeg", "data": "QUJD" } }
        ])
    );
    assert_eq!(body["generationConfig"]["responseModalities"], json!(["IMAGE"]));
}

#[tokio::test]
async fn test_no_image_part_is_absent() {
    let (base, _mock) = serve(
        StatusCode::OK,
        json!({ "candidates": [{ "content": { "parts": [{ "text": "Sorry" }] } }] }).to_string(),
    )
    .await;

    let image = client(&base).generate("test prompt", &photo()).await.unwrap();
    assert_eq!(image, None);
}

#[tokio::test]
async fn test_zero_candidates_is_absent() {
    let (base, _mock) = serve(StatusCode::OK, r#"{ "candidates": [] }"#).await;
    let image = client(&base).generate("test prompt", &photo()).await.unwrap();
    assert_eq!(image, None);
}

#[tokio::test]
async fn test_service_error_is_generic() {
    let (base, _mock) = serve(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{ "error": { "message": "backend exploded at line 42" } }"#,
    )
    .await;

    let err = client(&base).generate("test prompt", &photo()).await.unwrap_err();
    assert!(matches!(err, PosterError::Generation));
    assert_eq!(err.to_string(), "Failed to generate poster due to an API error.");
    assert!(!err.to_string().contains("line 42"));
}

#[tokio::test]
async fn test_malformed_response_is_generic() {
    let (base, _mock) = serve(StatusCode::OK, "this is not json").await;
    let err = client(&base).generate("test prompt", &photo()).await.unwrap_err();
    assert!(matches!(err, PosterError::Generation));
}

#[tokio::test]
async fn test_unreachable_service_is_generic() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"))
        .generate("test prompt", &photo())
        .await
        .unwrap_err();
    assert!(matches!(err, PosterError::Generation));
}

#[tokio::test]
async fn test_missing_credential_makes_no_request() {
    let (base, mock) = serve(StatusCode::OK, r#"{ "candidates": [] }"#).await;
    let client = GeminiClient::builder()
        .api_base(&base)
        .credential(Credential::Env("POSTER_STUDIO_TEST_MISSING_KEY".into()))
        .build();

    let err = client.generate("test prompt", &photo()).await.unwrap_err();
    assert!(matches!(err, PosterError::MissingCredential(_)));
    assert_eq!(
        err.to_string(),
        "POSTER_STUDIO_TEST_MISSING_KEY environment variable is not set."
    );
    assert!(mock.requests.lock().unwrap().is_empty());
}
