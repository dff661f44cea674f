//! Test-only helpers: a scripted model, canned replies and temp workspaces.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use serde_json::json;
use tempfile::TempDir;

use crate::core::types::{Message, Plan, Step};
use crate::io::config::AgentConfig;
use crate::io::model::LanguageModel;
use crate::io::prompt::PromptRole;
use crate::io::tools::ToolRegistry;

/// Reply returned once a role's queue is empty.
const DEFAULT_REPORT: &str = "Step done.";

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

#[derive(Debug, Default)]
struct Queues(HashMap<PromptRole, VecDeque<Reply>>);

impl Queues {
    fn queue(&mut self, role: PromptRole) -> &mut VecDeque<Reply> {
        self.0.entry(role).or_default()
    }
}

/// Model answering from per-role queues of scripted replies.
///
/// When a queue runs dry the planner fails (forcing the fallback plan), the
/// executor reports `Step done.`, the reviewer answers `{true, continue}` and
/// the code assistance roles answer `scripted <role> reply`.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    queues: Mutex<Queues>,
    calls: Mutex<Vec<(PromptRole, Vec<Message>)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, role: PromptRole, reply: Reply) -> Self {
        if let Ok(mut queues) = self.queues.lock() {
            queues.queue(role).push_back(reply);
        }
        self
    }

    pub fn with_plan(self, reply: impl Into<String>) -> Self {
        self.push(PromptRole::Planner, Reply::Text(reply.into()))
    }

    pub fn with_report(self, reply: impl Into<String>) -> Self {
        self.push(PromptRole::Executor, Reply::Text(reply.into()))
    }

    pub fn with_review(self, reply: impl Into<String>) -> Self {
        self.push(PromptRole::Reviewer, Reply::Text(reply.into()))
    }

    pub fn with_reply(self, role: PromptRole, reply: impl Into<String>) -> Self {
        self.push(role, Reply::Text(reply.into()))
    }

    /// Queue a transport failure for the next call from `role`.
    pub fn failing(self, role: PromptRole, message: impl Into<String>) -> Self {
        self.push(role, Reply::Fail(message.into()))
    }

    /// Messages sent by `role`, one entry per call.
    pub fn calls(&self, role: PromptRole) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(r, _)| *r == role)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn call_count(&self, role: PromptRole) -> usize {
        self.calls(role).len()
    }
}

impl LanguageModel for ScriptedModel {
    fn invoke(&self, messages: &[Message]) -> Result<String> {
        let role =
            PromptRole::detect(messages).ok_or_else(|| anyhow!("unrecognized prompt role"))?;
        self.calls
            .lock()
            .map_err(|_| anyhow!("calls lock poisoned"))?
            .push((role, messages.to_vec()));
        let next = self
            .queues
            .lock()
            .map_err(|_| anyhow!("queues lock poisoned"))?
            .queue(role)
            .pop_front();
        match next {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => bail!("{message}"),
            None => match role {
                PromptRole::Planner => bail!("no scripted planner reply"),
                PromptRole::Executor => Ok(DEFAULT_REPORT.to_string()),
                PromptRole::Reviewer => Ok(review_json(true, "continue")),
                PromptRole::Analyst
                | PromptRole::Generator
                | PromptRole::TestWriter
                | PromptRole::Refactorer => Ok(format!("scripted {} reply", role.as_str())),
            },
        }
    }
}

/// A plan of `n` tool-free steps.
pub fn plan(n: usize) -> Plan {
    let mut plan = Plan {
        steps: (0..n)
            .map(|i| Step {
                step_number: 0,
                objective: format!("objective {}", i + 1),
                action: format!("action {}", i + 1),
                tools_needed: Vec::new(),
                expected_outcome: format!("outcome {}", i + 1),
                tool_inputs: Default::default(),
            })
            .collect(),
    };
    plan.renumber();
    plan
}

/// Planner reply JSON for `plan(n)`.
pub fn plan_json(n: usize) -> String {
    serde_json::to_string(&plan(n)).unwrap_or_default()
}

/// Reviewer reply JSON.
pub fn review_json(step_completed: bool, next_action: &str) -> String {
    json!({
        "step_completed": step_completed,
        "next_action": next_action,
        "reason": format!("scripted {next_action}"),
    })
    .to_string()
}

/// Temporary workspace root for tool side effects.
pub struct TestWorkspace {
    dir: TempDir,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp workspace"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write a file relative to the workspace, creating parents.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write workspace file");
        path
    }

    /// Default config rooted at this workspace.
    pub fn config(&self) -> AgentConfig {
        let mut cfg = AgentConfig::default();
        cfg.tools.workspace_root = self.path().to_path_buf();
        cfg
    }

    pub fn registry(&self) -> ToolRegistry {
        ToolRegistry::from_config(&self.config().tools)
    }
}
