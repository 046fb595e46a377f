use super::*;
use axum::body::{Body, to_bytes};
use axum::http::Request;
use tower::ServiceExt;

use crate::embeddings::{Embedder, EmbeddingError};
use crate::generation::{AnswerGenerator, GenerationError};
use crate::http::HttpError;
use crate::store::{CollectionSpec, MemoryStore, Metric, RecordMetadata, VectorRecord, VectorStore};

const ORIGIN: &str = "http://127.0.0.1:5500";

enum Behavior {
    Succeed,
    Fail,
    TimeOut,
}

struct StubEmbedder(Behavior);

impl Embedder for StubEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self.0 {
            Behavior::Succeed => Ok(vec![1.0, 0.0]),
            Behavior::Fail => Err(EmbeddingError::Upstream(HttpError::Status {
                status: 401,
                body: "secret provider detail".to_string(),
            })),
            Behavior::TimeOut => Err(EmbeddingError::Upstream(HttpError::Timeout)),
        }
    }

    fn dimension(&self) -> usize {
        2
    }

    fn describe(&self) -> String {
        "stub".to_string()
    }
}

struct EchoGenerator;

impl AnswerGenerator for EchoGenerator {
    fn generate(&self, query: &str, context: &str) -> Result<String, GenerationError> {
        Ok(format!("{query} => {context}"))
    }
}

fn app(behavior: Behavior) -> Router {
    let store = MemoryStore::new();
    store
        .ensure_collection(&CollectionSpec::new("docs", 2, Metric::Cosine))
        .expect("collection should be created");
    store
        .upsert(
            "docs",
            "ns1",
            &[VectorRecord {
                id: "chunk-0".to_string(),
                vector: vec![1.0, 0.0],
                metadata: RecordMetadata::from_text("Paris is the capital of France"),
            }],
        )
        .expect("seed record should be written");

    let pipeline = QueryPipeline::new(
        Arc::new(StubEmbedder(behavior)),
        Arc::new(store),
        Arc::new(EchoGenerator),
        "docs",
        "ns1",
    );
    router(
        pipeline,
        cors_layer(&[ORIGIN.to_string()]).expect("origin should be valid"),
    )
}

fn post_query(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.expect("router should respond");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn missing_query_is_rejected() {
    let (status, body) = send(app(Behavior::Succeed), post_query("{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, serde_json::json!({ "error": "Query is required" }));
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let (status, body) = send(app(Behavior::Succeed), post_query(r#"{"query": "   "}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Query is required");
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let (status, body) = send(app(Behavior::Succeed), post_query("{\"query\": ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid JSON body");
}

#[tokio::test]
async fn answers_valid_query() {
    let (status, body) = send(
        app(Behavior::Succeed),
        post_query(r#"{"query": "What is the capital of France?"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({
            "response": "What is the capital of France? => Paris is the capital of France"
        })
    );
}

#[tokio::test]
async fn embedding_failure_is_a_gateway_error() {
    let (status, body) = send(
        app(Behavior::Fail),
        post_query(r#"{"query": "What is the capital of France?"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Failed to generate a response");
    assert!(!body.to_string().contains("secret provider detail"));
}

#[tokio::test]
async fn upstream_timeout_is_a_gateway_timeout() {
    let (status, body) = send(
        app(Behavior::TimeOut),
        post_query(r#"{"query": "What is the capital of France?"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body.get("response").is_none());
}

#[tokio::test]
async fn health_reports_ok() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request should build");
    let (status, body) = send(app(Behavior::Succeed), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn preflight_from_allowed_origin() {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/query")
        .header("origin", ORIGIN)
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .expect("request should build");

    let response = app(Behavior::Succeed)
        .oneshot(request)
        .await
        .expect("router should respond");

    let headers = response.headers();
    assert_eq!(
        headers
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some(ORIGIN)
    );
    assert_eq!(
        headers
            .get("access-control-allow-credentials")
            .and_then(|v| v.to_str().ok()),
        Some("true")
    );
}

#[tokio::test]
async fn other_origins_get_no_cors_headers() {
    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("origin", "http://evil.example")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query": "hi"}"#))
        .expect("request should build");

    let response = app(Behavior::Succeed)
        .oneshot(request)
        .await
        .expect("router should respond");

    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[test]
fn invalid_origin_is_reported() {
    let result = cors_layer(&["http://bad\norigin".to_string()]);
    assert!(matches!(result, Err(ServerError::InvalidOrigin(_))));
}

#[test]
fn status_mapping() {
    let bad = PipelineError::BadRequest(QUERY_REQUIRED.to_string());
    let timeout = PipelineError::Generation(GenerationError::Upstream(HttpError::Timeout));
    let failed = PipelineError::Generation(GenerationError::MalformedResponse("x".to_string()));

    assert_eq!(classify(&bad), (StatusCode::BAD_REQUEST, QUERY_REQUIRED));
    assert_eq!(classify(&timeout).0, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(classify(&failed), (StatusCode::BAD_GATEWAY, GENERATION_FAILED));
}
