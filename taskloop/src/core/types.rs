//! Shared types for the plan–execute–review loop.
//!
//! These types carry no I/O. `AgentState` is the only mutable record and is
//! owned by a single controller for the lifetime of one task execution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One natural-language unit of work submitted for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
}

impl Task {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            context: None,
            constraints: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints
            .get_or_insert_with(Vec::new)
            .push(constraint.into());
        self
    }
}

/// Code to analyze for quality, bugs, performance and security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAnalysisRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// Description of code to write, optionally extending existing code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGenerationRequest {
    pub description: String,
    pub language: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub existing_code: Option<String>,
}

/// Code to write unit tests for. The framework defaults per language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestGenerationRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub test_framework: Option<String>,
}

/// Code to restructure; `refactoring_type` names the goal ("optimize", "clean", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactoringRequest {
    pub code: String,
    pub language: String,
    pub refactoring_type: String,
}

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Only used for model requests; never stored in `AgentState::messages`.
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A role-tagged text entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One planned unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based; the position in `Plan::steps` is authoritative.
    #[serde(default)]
    pub step_number: u32,
    pub objective: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub tools_needed: Vec<String>,
    #[serde(default)]
    pub expected_outcome: String,
    /// Arguments per tool name. Tools without an entry are invoked with no arguments.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tool_inputs: BTreeMap<String, Map<String, Value>>,
}

/// Ordered list of steps produced once per task execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Rewrite `step_number` so it matches sequence order (1-based).
    pub fn renumber(&mut self) {
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.step_number = idx as u32 + 1;
        }
    }
}

/// Execution status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Planning,
    Executing,
    Completed,
    Error,
}

impl AgentStatus {
    /// `Completed` and `Error` are absorbing.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Planning => "planning",
            AgentStatus::Executing => "executing",
            AgentStatus::Completed => "completed",
            AgentStatus::Error => "error",
        }
    }
}

/// Status recorded for a reviewed step. Only completed steps are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
}

/// Outcome record appended once per step the reviewer marks completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Zero-based index into `Plan::steps`.
    pub step: usize,
    pub status: StepStatus,
    pub result: String,
}

/// Reviewer-requested next move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NextAction {
    Continue,
    Retry,
    End,
}

/// Structured judgment returned by the reviewer model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub step_completed: bool,
    pub next_action: NextAction,
    #[serde(default)]
    pub reason: String,
}

/// What the reviewer produced for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewVerdict {
    /// The model returned a well-formed decision.
    Decision(ReviewDecision),
    /// The reply could not be parsed; the step is advanced optimistically.
    Fallback { raw: String },
}

/// Mutable execution context for one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub task: String,
    pub context: BTreeMap<String, Value>,
    pub plan: Option<Plan>,
    pub current_step: usize,
    pub results: Vec<StepResult>,
    pub status: AgentStatus,
}

impl AgentState {
    pub fn new(task: &Task) -> Self {
        Self {
            messages: Vec::new(),
            task: task.task.clone(),
            context: task.context.clone().unwrap_or_default(),
            plan: None,
            current_step: 0,
            results: Vec::new(),
            status: AgentStatus::Planning,
        }
    }

    pub fn step_count(&self) -> usize {
        self.plan.as_ref().map_or(0, Plan::len)
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// The trailing `window` transcript entries, oldest first.
    pub fn trailing_messages(&self, window: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }
}
