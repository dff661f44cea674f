//! HTTP and WebSocket handlers.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use taskloop::agents::assistant::AssistantAgent;
use taskloop::core::types::{
    CodeAnalysisRequest, CodeGenerationRequest, RefactoringRequest, Task, TestGenerationRequest,
};
use taskloop::io::model::LanguageModel;
use taskloop::response::{AgentResponse, AssistResponse};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/agent/execute", post(execute))
        .route("/agent/analyze-code", post(analyze_code))
        .route("/agent/generate-code", post(generate_code))
        .route("/agent/generate-tests", post(generate_tests))
        .route("/agent/refactor-code", post(refactor_code))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "taskloop agent backend",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "backend": state.backend,
    }))
}

async fn health() -> Json<Value> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    Json(json!({"status": "healthy", "timestamp": timestamp}))
}

/// POST /agent/execute - run a task and return the response envelope.
async fn execute(State(state): State<AppState>, Json(task): Json<Task>) -> Json<AgentResponse> {
    info!(task_len = task.task.len(), "execute request");
    Json(state.execute(task).await)
}

async fn analyze_code(
    State(state): State<AppState>,
    Json(request): Json<CodeAnalysisRequest>,
) -> Json<AssistResponse> {
    Json(run_action(&state, Action::Analyze, request).await)
}

async fn generate_code(
    State(state): State<AppState>,
    Json(request): Json<CodeGenerationRequest>,
) -> Json<AssistResponse> {
    Json(run_action(&state, Action::Generate, request).await)
}

async fn generate_tests(
    State(state): State<AppState>,
    Json(request): Json<TestGenerationRequest>,
) -> Json<AssistResponse> {
    Json(run_action(&state, Action::Tests, request).await)
}

async fn refactor_code(
    State(state): State<AppState>,
    Json(request): Json<RefactoringRequest>,
) -> Json<AssistResponse> {
    Json(run_action(&state, Action::Refactor, request).await)
}

/// Code assistance operations reachable over HTTP and WebSocket.
#[derive(Debug, Clone, Copy)]
enum Action {
    Analyze,
    Generate,
    Tests,
    Refactor,
}

impl Action {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "analyze_code" => Some(Action::Analyze),
            "generate_code" => Some(Action::Generate),
            "generate_tests" => Some(Action::Tests),
            "refactor_code" => Some(Action::Refactor),
            _ => None,
        }
    }
}

/// Request payloads the assistant can serve.
trait AssistRequest: DeserializeOwned + Send + 'static {
    fn serve(&self, agent: &AssistantAgent, model: &dyn LanguageModel) -> AssistResponse;
}

impl AssistRequest for CodeAnalysisRequest {
    fn serve(&self, agent: &AssistantAgent, model: &dyn LanguageModel) -> AssistResponse {
        agent.analyze_code(model, self)
    }
}

impl AssistRequest for CodeGenerationRequest {
    fn serve(&self, agent: &AssistantAgent, model: &dyn LanguageModel) -> AssistResponse {
        agent.generate_code(model, self)
    }
}

impl AssistRequest for TestGenerationRequest {
    fn serve(&self, agent: &AssistantAgent, model: &dyn LanguageModel) -> AssistResponse {
        agent.generate_tests(model, self)
    }
}

impl AssistRequest for RefactoringRequest {
    fn serve(&self, agent: &AssistantAgent, model: &dyn LanguageModel) -> AssistResponse {
        agent.refactor_code(model, self)
    }
}

async fn run_action<R: AssistRequest>(
    state: &AppState,
    action: Action,
    request: R,
) -> AssistResponse {
    info!(action = ?action, "assist request");
    state
        .assist(move |agent, model| request.serve(agent, model))
        .await
}

/// Decode `data` for `action` and run it.
async fn dispatch_action(state: &AppState, action: Action, data: Value) -> AssistResponse {
    match action {
        Action::Analyze => decode_and_run::<CodeAnalysisRequest>(state, action, data).await,
        Action::Generate => decode_and_run::<CodeGenerationRequest>(state, action, data).await,
        Action::Tests => decode_and_run::<TestGenerationRequest>(state, action, data).await,
        Action::Refactor => decode_and_run::<RefactoringRequest>(state, action, data).await,
    }
}

async fn decode_and_run<R: AssistRequest>(
    state: &AppState,
    action: Action,
    data: Value,
) -> AssistResponse {
    match serde_json::from_value::<R>(data) {
        Ok(request) => run_action(state, action, request).await,
        Err(err) => AssistResponse::failed("Invalid request", err.to_string()),
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: AppState) {
    debug!("websocket connected");
    while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(err = %err, "websocket receive failed");
                break;
            }
        };
        let reply = handle_ws_text(&state, text.as_str()).await;
        if let Err(err) = socket.send(Message::Text(reply.to_string().into())).await {
            warn!(err = %err, "websocket send failed");
            break;
        }
    }
    debug!("websocket disconnected");
}

/// Answer one WebSocket text frame.
///
/// Frames carrying `action` instead of `type` run a code assistance operation
/// and answer with its bare response envelope.
pub async fn handle_ws_text(state: &AppState, text: &str) -> Value {
    let Ok(message) = serde_json::from_str::<Value>(text) else {
        return ws_error("Invalid JSON");
    };
    if message.get("type").is_none()
        && let Some(name) = message.get("action").and_then(Value::as_str)
    {
        let data = message.get("data").cloned().unwrap_or(Value::Null);
        let response = match Action::parse(name) {
            Some(action) => dispatch_action(state, action, data).await,
            None => AssistResponse::failed(
                "Unknown action",
                format!("Action '{name}' not supported"),
            ),
        };
        return json!(response);
    }
    match message.get("type").and_then(Value::as_str) {
        Some("ping") => json!({"type": "pong"}),
        Some("task") => match serde_json::from_value::<Task>(message) {
            Ok(task) => {
                info!(task_len = task.task.len(), "websocket task");
                let response = state.execute(task).await;
                json!({"type": "result", "data": response})
            }
            Err(err) => ws_error(&format!("Invalid task message: {err}")),
        },
        _ => ws_error("Unknown message type"),
    }
}

fn ws_error(message: &str) -> Value {
    json!({"type": "error", "message": message})
}
