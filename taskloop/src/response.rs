//! Structured result of one task execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::{AgentState, AgentStatus, Message, Plan, Role, StepResult};

/// Snapshot of the final `AgentState` returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionData {
    pub status: AgentStatus,
    pub plan: Option<Plan>,
    pub results: Vec<StepResult>,
    pub messages: Vec<Message>,
}

/// Outcome envelope for `run`, `POST /agent/execute` and the WebSocket `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<ExecutionData>,
    pub error: Option<String>,
}

impl AgentResponse {
    /// Response for an execution that reached a terminal status.
    pub fn from_state(state: AgentState) -> Self {
        let success = state.status == AgentStatus::Completed;
        let error = (!success).then(|| {
            state
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::Assistant)
                .map_or_else(
                    || format!("execution ended with status {}", state.status.as_str()),
                    |m| m.content.clone(),
                )
        });
        Self {
            success,
            message: if success {
                "Task execution completed".to_string()
            } else {
                "Task execution failed".to_string()
            },
            data: Some(ExecutionData {
                status: state.status,
                plan: state.plan,
                results: state.results,
                messages: state.messages,
            }),
            error,
        }
    }

    /// Response for an error caught at the execution boundary.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: "Task execution failed".to_string(),
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome envelope for the single-shot code assistance operations.
///
/// `data` holds operation-specific fields such as `analysis` or `test_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl AssistResponse {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Task;

    #[test]
    fn completed_state_is_success_without_error() {
        let mut state = AgentState::new(&Task::new("t"));
        state.status = AgentStatus::Completed;
        let response = AgentResponse::from_state(state);
        assert!(response.success);
        assert!(response.error.is_none());
        assert_eq!(response.data.expect("data").status, AgentStatus::Completed);
    }

    #[test]
    fn error_state_carries_last_diagnostic() {
        let mut state = AgentState::new(&Task::new("t"));
        state.push_assistant("Planning completed, 0 steps");
        state.push_assistant("Execution failed: the plan has no steps");
        state.status = AgentStatus::Error;
        let response = AgentResponse::from_state(state);
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Execution failed: the plan has no steps")
        );
    }

    #[test]
    fn failure_serializes_null_data() {
        let value = serde_json::to_value(AgentResponse::failure("boom")).expect("serialize");
        assert_eq!(value["success"], false);
        assert!(value["data"].is_null());
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn failed_assist_has_no_data() {
        let value = serde_json::to_value(AssistResponse::failed("Unknown action", "Action 'x' not supported"))
            .expect("serialize");
        assert_eq!(value["success"], false);
        assert!(value["data"].is_null());
        assert_eq!(value["message"], "Unknown action");
    }
}
