//! HTTP front end for the query pipeline.
//!
//! `POST /query` takes `{"query": "..."}` and answers `{"response": "..."}`.
//! Upstream failures map to 5xx with a generic body; the details are only
//! logged.

#[cfg(test)]
mod tests;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::pipeline::{PipelineError, QueryPipeline};

pub const QUERY_REQUIRED: &str = "Query is required";
pub const INVALID_JSON: &str = "Invalid JSON body";
pub const GENERATION_FAILED: &str = "Failed to generate a response";
pub const UPSTREAM_TIMEOUT: &str = "The request timed out";
pub const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid CORS origin: {0}")]
    InvalidOrigin(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
struct AppState {
    pipeline: QueryPipeline,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// HTTP status and public message for a failed run
#[inline]
pub fn classify(error: &PipelineError) -> (StatusCode, &'static str) {
    if error.is_bad_request() {
        (StatusCode::BAD_REQUEST, QUERY_REQUIRED)
    } else if error.is_timeout() {
        (StatusCode::GATEWAY_TIMEOUT, UPSTREAM_TIMEOUT)
    } else {
        (StatusCode::BAD_GATEWAY, GENERATION_FAILED)
    }
}

async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("query", request_id = %request_id);

    async move {
        let request = match payload {
            Ok(Json(request)) => request,
            Err(rejection) => {
                warn!("Rejected request body: {}", rejection.body_text());
                return error_response(StatusCode::BAD_REQUEST, INVALID_JSON);
            }
        };

        let Some(query) = request.query.filter(|q| !q.trim().is_empty()) else {
            return error_response(StatusCode::BAD_REQUEST, QUERY_REQUIRED);
        };

        info!("Received query ({} chars)", query.len());
        let pipeline = state.pipeline.clone();
        let span = tracing::Span::current();
        let outcome =
            tokio::task::spawn_blocking(move || span.in_scope(|| pipeline.run(&query))).await;

        match outcome {
            Ok(Ok(answer)) => {
                info!("Answered with {} matches", answer.matches.len());
                Json(QueryResponse {
                    response: answer.text,
                })
                .into_response()
            }
            Ok(Err(e)) => {
                let (status, message) = classify(&e);
                error_response(status, message)
            }
            Err(e) => {
                error!("Query task failed: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
            }
        }
    }
    .instrument(span)
    .await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// One explicit allow-list; anything not listed gets no CORS headers
#[inline]
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, ServerError> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin.trim_end_matches('/'))
                .map_err(|_| ServerError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}

#[inline]
pub fn router(pipeline: QueryPipeline, cors: CorsLayer) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/health", get(health))
        .with_state(Arc::new(AppState { pipeline }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl-C
#[inline]
pub async fn run(config: &ServerConfig, pipeline: QueryPipeline) -> Result<(), ServerError> {
    let app = router(pipeline, cors_layer(&config.allowed_origins)?);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("Server running on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
