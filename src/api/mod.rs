//! HTTP API server
//!
//! Exposes the dialogue engine over HTTP: `POST /chat` streams a reply
//! as plain text, `GET /health` reports liveness. Voice stays local;
//! the API is text-only.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::agent::DialogueEngine;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<DialogueEngine>,
}

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Conversation to continue; a fresh one is created when omitted
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// API server over the dialogue engine
pub struct ApiServer {
    state: ApiState,
    port: u16,
}

impl ApiServer {
    /// Create a server for the given engine and port
    #[must_use]
    pub fn new(engine: Arc<DialogueEngine>, port: u16) -> Self {
        Self {
            state: ApiState { engine },
            port,
        }
    }

    /// Build the router with all routes
    fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/chat", post(chat))
            .route("/health", get(health))
            .with_state(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// `POST /chat`: stream the reply text as it is generated
async fn chat(State(state): State<ApiState>, Json(request): Json<ChatRequest>) -> Response {
    if request.message.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "message must not be empty").into_response();
    }

    let session_id = request
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::info!(session_id = %session_id, "chat request");

    let tokens = state.engine.run_turn(&session_id, &request.message);

    // Tool-call notifications are internal; only reply text goes on the wire
    let body = tokens.filter_map(|token| async move {
        match token {
            Ok(token) if token.is_tool_call => None,
            Ok(token) => Some(Ok(axum::body::Bytes::from(token.text))),
            Err(e) => Some(Err(e)),
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("x-session-id", session_id)
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// `GET /health`: liveness probe
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_session_id_is_optional() {
        let request: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(request.session_id.is_none());
    }

    #[test]
    fn chat_request_with_session_id() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"message":"hi","session_id":"abc"}"#).unwrap();
        assert_eq!(request.session_id.as_deref(), Some("abc"));
    }
}
