#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use docrag::commands::build_pipeline;
use docrag::config::{ApiKey, Config, EmbeddingProvider};
use docrag::embeddings::build_embedder;
use docrag::ingest::{IngestOptions, Ingestor};
use docrag::pipeline::Stage;
use docrag::server::{cors_layer, router};
use docrag::store::{PineconeStore, VectorStore};
use serde_json::{Value, json};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUESTION: &str = "What is the capital of France?";
const PARIS: &str = "Paris is the capital of France.";

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.embedding.provider = EmbeddingProvider::OpenAi;
    config.embedding.endpoint = Some(format!("{}/v1/embeddings", server.uri()));
    config.embedding.dimension = Some(3);
    config.embedding.retry_attempts = 1;
    config.store.endpoint = server.uri();
    config.store.retry_attempts = 1;
    config.generation.endpoint = format!("{}/v1/chat/completions", server.uri());
    config.generation.retry_attempts = 1;
    config.secrets.openai = Some(ApiKey::new("sk-test"));
    config.secrets.pinecone = Some(ApiKey::new("pc-test"));
    config.secrets.segmind = Some(ApiKey::new("sg-test"));
    config
        .validate()
        .expect("test configuration should be valid");
    config
}

fn index_description(server: &MockServer) -> Value {
    json!({
        "name": "chatagent-xenova",
        "dimension": 3,
        "metric": "dotproduct",
        "host": server.uri(),
        "status": { "ready": true, "state": "Ready" }
    })
}

async fn mount_index(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/indexes/chatagent-xenova"))
        .and(header("Api-Key", "pc-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(index_description(server)))
        .mount(server)
        .await;
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 0, "embedding": [0.6, 0.8, 0.0] }]
        })))
        .mount(server)
        .await;
}

async fn mount_query(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({
            "namespace": "ns1",
            "topK": 5,
            "includeMetadata": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "namespace": "ns1",
            "matches": [
                { "id": "chunk-0", "score": 0.98, "metadata": { "text": PARIS, "source": "geo.txt" } },
                { "id": "chunk-1", "score": 0.41, "metadata": { "text": "France is in Europe." } }
            ]
        })))
        .mount(server)
        .await;
}

async fn mount_chat(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sg-test"))
        .and(body_partial_json(json!({
            "model": "llama3-8b-chat",
            "messages": [
                {
                    "role": "system",
                    "content": "You are an AI assistant. Answer based on the given context."
                },
                {
                    "role": "user",
                    "content": format!("{QUESTION}\n\nContext: {PARIS}\nFrance is in Europe.")
                }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Paris.  " } }]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn answers_from_retrieved_context() {
    let server = MockServer::start().await;
    mount_index(&server).await;
    mount_embeddings(&server).await;
    mount_query(&server).await;
    mount_chat(&server).await;

    let pipeline = build_pipeline(&config_for(&server)).expect("pipeline should build");
    let answer = tokio::task::spawn_blocking(move || pipeline.run(QUESTION))
        .await
        .expect("blocking task should not panic")
        .expect("query should succeed");

    assert_eq!(answer.text, "Paris.");
    assert_eq!(answer.matches.len(), 2);
    assert!(answer.context.starts_with(PARIS));
}

#[tokio::test]
async fn server_answers_over_http() {
    let server = MockServer::start().await;
    mount_index(&server).await;
    mount_embeddings(&server).await;
    mount_query(&server).await;
    mount_chat(&server).await;

    let config = config_for(&server);
    let pipeline = build_pipeline(&config).expect("pipeline should build");
    let app = router(
        pipeline,
        cors_layer(&config.server.allowed_origins).expect("default origins should be valid"),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "query": QUESTION }).to_string()))
        .expect("request should build");
    let response = app.oneshot(request).await.expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body: Value = serde_json::from_slice(&bytes).expect("body should be json");
    assert_eq!(body, json!({ "response": "Paris." }));
}

#[tokio::test]
async fn embedding_failure_never_returns_ok() {
    let server = MockServer::start().await;
    mount_index(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("provider exploded"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let pipeline = build_pipeline(&config).expect("pipeline should build");

    let direct = pipeline.clone();
    let error = tokio::task::spawn_blocking(move || direct.run(QUESTION))
        .await
        .expect("blocking task should not panic")
        .expect_err("embedding failure should fail the query");
    assert_eq!(error.stage(), Stage::Embedding);

    let app = router(
        pipeline,
        cors_layer(&config.server.allowed_origins).expect("default origins should be valid"),
    );
    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "query": QUESTION }).to_string()))
        .expect("request should build");
    let response = app.oneshot(request).await.expect("router should respond");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body = String::from_utf8_lossy(&bytes);
    assert!(!body.contains("provider exploded"));
}

#[tokio::test]
async fn ingests_text_file_into_pinecone() {
    let server = MockServer::start().await;
    mount_index(&server).await;
    mount_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_partial_json(json!({
            "namespace": "ns1",
            "vectors": [{ "id": "chunk-0", "metadata": { "text": PARIS, "source": "geo.txt" } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("should create TempDir successfully");
    let document = dir.path().join("geo.txt");
    fs::write(&document, PARIS).expect("should write document");

    let config = config_for(&server);
    let embedder =
        build_embedder(&config.embedding, &config.secrets).expect("embedder should build");
    let key = config.secrets.pinecone.clone().expect("pinecone key is set");
    let store: Arc<dyn VectorStore> = Arc::new(
        PineconeStore::from_config(&config.store, key).expect("store settings should be valid"),
    );

    let report = Ingestor::new(embedder, store, IngestOptions::from_config(&config))
        .with_progress(false)
        .ingest_path(&document)
        .await
        .expect("ingestion should succeed");

    assert_eq!(report.source, "geo.txt");
    assert_eq!(report.chunks, 1);
    assert_eq!(report.written, 1);
    assert!(report.skipped.is_empty());
}
