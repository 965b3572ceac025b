//! HTTP surface.
//!
//! - `GET /`: service banner
//! - `GET /health`: liveness
//! - `POST /chat`: run one chat request through the pipeline
//!
//! Every pipeline failure becomes a 500 with a `detail` message; the full
//! error is only logged. Handler panics get the same envelope.

use std::any::Any;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::chat::{ChatPipeline, ChatRequest, ChatResponse};
use crate::config::Config;
use crate::error::Error;
use crate::Result;

const SERVICE_NAME: &str = "gardenbook-chat-api";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
}

/// Client-facing error envelope.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Error processing chat: {:?}", self.0);
        detail_response(&self.0.to_string())
    }
}

fn detail_response(message: &str) -> Response {
    let body = json!({"detail": format!("Error processing chat: {}", message)});
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unexpected panic".to_string()
    };
    error!("Chat handler panicked: {}", message);
    detail_response(&message)
}

/// Build the router with panic recovery, CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({"message": "Welcome to the Gardenbook Chat API"}))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": SERVICE_NAME}))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);

    let response = state.pipeline.handle(request).instrument(span).await?;
    Ok(Json(response))
}

/// Serve until Ctrl+C.
pub async fn serve(config: &Config) -> Result<()> {
    let pipeline = ChatPipeline::from_config(config)?;
    let router = build_router(AppState {
        pipeline: Arc::new(pipeline),
    });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gardenbook chat listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeLlmClient;
    use crate::agent::ModelBinding;
    use crate::chat::KnowledgeClient;
    use crate::tools::testing::{FakeLauncher, FakeToolClient};
    use crate::tools::ToolLauncher;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(launcher: Arc<dyn ToolLauncher>, llm: FakeLlmClient) -> Router {
        let pipeline = ChatPipeline::new(
            KnowledgeClient::new("http://127.0.0.1:1", Duration::from_millis(200)),
            launcher,
            ModelBinding { llm: Arc::new(llm), max_iterations: 5 },
        );
        build_router(AppState { pipeline: Arc::new(pipeline) })
    }

    fn working_app(reply: &str) -> Router {
        let tools = Arc::new(FakeToolClient::with_tools(&["list_plants"]));
        app(Arc::new(FakeLauncher::serving(tools)), FakeLlmClient::new(vec![reply]))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::post("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let router = working_app("unused");

        let response = router
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["message"].as_str().unwrap().contains("Gardenbook"));

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], SERVICE_NAME);
    }

    #[tokio::test]
    async fn test_chat_returns_reply() {
        let router = working_app("Water it sparingly.");

        let response = router
            .oneshot(chat_request(
                r#"{"messages":[{"role":"user","content":"How often should I water a cactus?"}]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"response": "Water it sparingly."}));
    }

    #[tokio::test]
    async fn test_session_failure_is_500_with_detail() {
        let router = app(Arc::new(FakeLauncher::broken()), FakeLlmClient::new(vec!["unused"]));

        let response = router
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Error processing chat: Failed to create agent:"));
    }

    #[tokio::test]
    async fn test_invocation_failure_is_500() {
        let tools = Arc::new(FakeToolClient::with_tools(&[]));
        let router = app(Arc::new(FakeLauncher::serving(tools)), FakeLlmClient::failing("boom"));

        let response = router
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("boom"));
    }

    struct PanickingLauncher;

    #[async_trait::async_trait]
    impl ToolLauncher for PanickingLauncher {
        async fn launch(&self) -> Result<Arc<dyn crate::tools::ToolClient>> {
            panic!("provider registry corrupted");
        }
    }

    #[tokio::test]
    async fn test_handler_panic_is_500_with_detail() {
        let router = app(Arc::new(PanickingLauncher), FakeLlmClient::new(vec!["unused"]));

        let response = router
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"detail": "Error processing chat: provider registry corrupted"})
        );
    }

    #[tokio::test]
    async fn test_cors_preflight_allowed() {
        let router = working_app("unused");

        let response = router
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/chat")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
