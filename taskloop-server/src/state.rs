//! Shared application state for the agent server.

use std::sync::Arc;

use taskloop::agents::assistant::AssistantAgent;
use taskloop::controller::run_task;
use taskloop::core::types::Task;
use taskloop::io::config::LoopConfig;
use taskloop::io::model::LanguageModel;
use taskloop::io::tools::ToolRegistry;
use taskloop::response::{AgentResponse, AssistResponse};
use tracing::error;

/// Shared state accessible from all request handlers.
///
/// Executions share the model client and tool registry but each owns its
/// `AgentState`, so concurrent requests need no locking.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn LanguageModel>,
    pub tools: Arc<ToolRegistry>,
    pub limits: LoopConfig,
    /// Backend name reported by `GET /`.
    pub backend: String,
}

impl AppState {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: ToolRegistry,
        limits: LoopConfig,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            model,
            tools: Arc::new(tools),
            limits,
            backend: backend.into(),
        }
    }

    /// Run one task on a blocking worker thread.
    pub async fn execute(&self, task: Task) -> AgentResponse {
        let model = Arc::clone(&self.model);
        let tools = Arc::clone(&self.tools);
        let limits = self.limits.clone();
        let joined =
            tokio::task::spawn_blocking(move || run_task(model.as_ref(), &tools, &limits, task))
                .await;
        match joined {
            Ok(response) => response,
            Err(err) => {
                error!(err = %err, "execution worker failed");
                AgentResponse::failure(format!("execution worker failed: {err}"))
            }
        }
    }

    /// Run one code assistance operation on a blocking worker thread.
    pub async fn assist<F>(&self, operation: F) -> AssistResponse
    where
        F: FnOnce(&AssistantAgent, &dyn LanguageModel) -> AssistResponse + Send + 'static,
    {
        let model = Arc::clone(&self.model);
        let agent = AssistantAgent::new(self.limits.prompt_budget_bytes);
        match tokio::task::spawn_blocking(move || operation(&agent, model.as_ref())).await {
            Ok(response) => response,
            Err(err) => {
                error!(err = %err, "assistant worker failed");
                AssistResponse::failed("Assistant worker failed", err.to_string())
            }
        }
    }
}
