use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use docchat_core::{ChainError, ChainInput, QuestionAnswering};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const SERVICE_NAME: &str = "Medical ChatAPP API";
pub const NOT_LOADED_MESSAGE: &str = "Chatbot not loaded. Please check server logs.";

/// Process-wide handles shared by every handler. `chatbot` is `None` when
/// startup failed and the service is running degraded.
#[derive(Clone, Default)]
pub struct AppState {
    chatbot: Option<Arc<dyn QuestionAnswering>>,
}

impl AppState {
    pub fn new(chatbot: Option<Arc<dyn QuestionAnswering>>) -> Self {
        Self { chatbot }
    }

    pub fn chatbot_loaded(&self) -> bool {
        self.chatbot.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub processing_time: f64,
    pub success: bool,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/api", get(api_info))
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let loaded = state.chatbot_loaded();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, chatbot_loaded = loaded, "docchat listening on http://{addr}");
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn api_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "chat": "POST /api/chat",
            "health": "GET /api/health",
        },
        "chatbot_loaded": state.chatbot_loaded(),
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let loaded = state.chatbot_loaded();
    Json(json!({
        "status": if loaded { "healthy" } else { "degraded" },
        "chatbot_loaded": loaded,
        "timestamp": Utc::now().timestamp_micros() as f64 / 1_000_000.0,
    }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let started = Instant::now();

    let Some(chatbot) = state.chatbot.as_ref() else {
        return Ok(Json(ChatResponse {
            answer: NOT_LOADED_MESSAGE.to_string(),
            processing_time: started.elapsed().as_secs_f64(),
            success: false,
        }));
    };

    let output = chatbot
        .invoke(ChainInput::new(request.message))
        .await
        .map_err(|error| {
            error!(%error, "chat invocation failed");
            ApiError(error)
        })?;

    Ok(Json(ChatResponse {
        answer: output.answer,
        processing_time: round_millis(started.elapsed().as_secs_f64()),
        success: true,
    }))
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1_000.0).round() / 1_000.0
}

struct ApiError(ChainError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": format!("Error: {}", self.0) })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use docchat_core::{
        ChainOutput, ChatModel, Document, DocumentRetriever, IndexError, ModelError,
        PromptTemplate, RetrievalChain,
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    struct CannedChatbot;

    #[async_trait]
    impl QuestionAnswering for CannedChatbot {
        async fn invoke(&self, input: ChainInput) -> Result<ChainOutput, ChainError> {
            Ok(ChainOutput {
                answer: format!("You asked: {}", input.input),
                context: vec![Document::new("context")],
                input: input.input,
            })
        }
    }

    struct FailingChatbot;

    #[async_trait]
    impl QuestionAnswering for FailingChatbot {
        async fn invoke(&self, _input: ChainInput) -> Result<ChainOutput, ChainError> {
            Err(ChainError::Generation(ModelError::MissingApiKey(
                "groq".to_string(),
            )))
        }
    }

    struct StaticRetriever;

    #[async_trait]
    impl DocumentRetriever for StaticRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Document>, IndexError> {
            Ok(vec![Document::new("Gout is a form of arthritis.")])
        }
    }

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, _prompt: &str) -> Result<String, ModelError> {
            Ok("I don't know.".to_string())
        }
    }

    fn loaded(chatbot: impl QuestionAnswering + 'static) -> AppState {
        AppState::new(Some(Arc::new(chatbot)))
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = app_router(state)
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("readable body")
            .to_bytes();
        let body = serde_json::from_slice(&bytes).expect("json body");
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("valid request")
    }

    fn chat_request(message: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "message": message }).to_string()))
            .expect("valid request")
    }

    #[tokio::test]
    async fn degraded_chat_returns_ok_with_failure_flag() {
        let (status, body) = send(AppState::default(), chat_request("hello")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["answer"], NOT_LOADED_MESSAGE);
        assert!(body["processing_time"].as_f64().is_some());
    }

    #[tokio::test]
    async fn health_reports_degraded_without_chatbot() {
        let (status, body) = send(AppState::default(), get_request("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["chatbot_loaded"], false);
        assert!(body["timestamp"].as_f64().is_some_and(|ts| ts > 0.0));
    }

    #[tokio::test]
    async fn health_reports_healthy_with_chatbot() {
        let (_, body) = send(loaded(CannedChatbot), get_request("/api/health")).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["chatbot_loaded"], true);
    }

    #[tokio::test]
    async fn chat_returns_chain_answer() {
        let (status, body) = send(loaded(CannedChatbot), chat_request("What is gout?")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["answer"], "You asked: What is gout?");
    }

    #[tokio::test]
    async fn empty_message_is_answered_by_the_chain() {
        let chain = RetrievalChain::new(StaticRetriever, EchoModel, PromptTemplate::default());
        let (status, body) = send(loaded(chain), chat_request("")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["answer"], "I don't know.");
    }

    #[tokio::test]
    async fn chain_failure_is_a_server_error() {
        let (status, body) = send(loaded(FailingChatbot), chat_request("hello")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body["detail"].as_str().expect("detail string");
        assert!(detail.starts_with("Error: generation failed"));
    }

    #[tokio::test]
    async fn api_info_lists_endpoints() {
        let (_, body) = send(loaded(CannedChatbot), get_request("/api")).await;

        assert_eq!(body["name"], SERVICE_NAME);
        assert_eq!(body["endpoints"]["chat"], "POST /api/chat");
        assert_eq!(body["chatbot_loaded"], true);
    }

    #[test]
    fn processing_time_is_rounded_to_milliseconds() {
        assert_eq!(round_millis(1.234_567), 1.235);
    }
}
