//! Test utilities for keihi-core
//!
//! This module provides a mock completion server that speaks both the
//! OpenAI-compatible and the Ollama HTTP APIs, for backend and integration
//! tests that need a real socket.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::ai::MockBackend;

#[derive(Clone)]
enum Behavior {
    /// Keyword classification of the rendered prompt
    Keywords,
    /// Same reply text for every request
    Reply(String),
    /// HTTP 500 on every route
    Failing,
}

/// Mock completion server for testing and development
pub struct MockCompletionServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockCompletionServer {
    /// Start a server that classifies prompts by keyword
    pub async fn start() -> Self {
        Self::spawn(Behavior::Keywords).await
    }

    /// Start a server that answers every completion with `reply`
    pub async fn start_with_reply(reply: &str) -> Self {
        Self::spawn(Behavior::Reply(reply.to_string())).await
    }

    /// Start a server that fails every request with HTTP 500
    pub async fn start_failing() -> Self {
        Self::spawn(Behavior::Failing).await
    }

    async fn spawn(behavior: Behavior) -> Self {
        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .route("/api/tags", get(handle_models))
            .route("/api/generate", post(handle_generate))
            .with_state(Arc::new(behavior));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockCompletionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reply_for(behavior: &Behavior, prompt: &str) -> Option<String> {
    match behavior {
        Behavior::Keywords => Some(MockBackend::keyword_reply(prompt)),
        Behavior::Reply(reply) => Some(reply.clone()),
        Behavior::Failing => None,
    }
}

fn server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "mock failure").into_response()
}

async fn handle_models(State(behavior): State<Arc<Behavior>>) -> Response {
    if matches!(*behavior, Behavior::Failing) {
        return server_error();
    }
    Json(serde_json::json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model"}],
        "models": [{"name": "mock-model:latest"}],
    }))
    .into_response()
}

/// Text of the last user message, whether plain or multimodal
fn prompt_text(request: &Value) -> String {
    let user = request["messages"]
        .as_array()
        .and_then(|msgs| msgs.iter().rev().find(|m| m["role"] == "user"));
    let Some(user) = user else {
        return String::new();
    };
    match &user["content"] {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

async fn handle_chat(
    State(behavior): State<Arc<Behavior>>,
    Json(request): Json<Value>,
) -> Response {
    let Some(content) = reply_for(&behavior, &prompt_text(&request)) else {
        return server_error();
    };

    Json(ChatResponse {
        choices: vec![ChatChoice {
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
            },
        }],
    })
    .into_response()
}

async fn handle_generate(
    State(behavior): State<Arc<Behavior>>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let Some(response) = reply_for(&behavior, &request.prompt) else {
        return server_error();
    };

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
    .into_response()
}

// Request/Response types for the mock server

#[derive(Debug, Serialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}
