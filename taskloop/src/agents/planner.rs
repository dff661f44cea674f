//! Planner agent: task in, ordered plan out.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::parse::parse_plan;
use crate::core::types::{Plan, Step, Task};
use crate::io::model::LanguageModel;
use crate::io::prompt::{PlannerInput, PromptBuilder, ToolSummary};
use crate::io::tools::ToolRegistry;

use super::prompt_messages;

/// Where a plan came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSource {
    Model,
    /// The model call or its reply was unusable.
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub source: PlanSource,
}

#[derive(Debug, Clone)]
pub struct PlannerAgent {
    prompt_budget_bytes: usize,
}

impl PlannerAgent {
    pub fn new(prompt_budget_bytes: usize) -> Self {
        Self {
            prompt_budget_bytes,
        }
    }

    /// Produce a plan. Never fails: any error yields the single-step fallback plan.
    #[instrument(skip_all, fields(tools = tools.len()))]
    pub fn run<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        tools: &ToolRegistry,
        task: &Task,
    ) -> PlanOutcome {
        match self.request_plan(model, tools, task) {
            Ok(plan) => {
                info!(steps = plan.len(), "plan generated");
                PlanOutcome {
                    plan,
                    source: PlanSource::Model,
                }
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(%reason, "planning failed, using single-step plan");
                PlanOutcome {
                    plan: fallback_plan(task, tools),
                    source: PlanSource::Fallback { reason },
                }
            }
        }
    }

    fn request_plan<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        tools: &ToolRegistry,
        task: &Task,
    ) -> Result<Plan> {
        let context = task.context.clone().unwrap_or_default();
        let constraints = task.constraints.clone().unwrap_or_default();
        let prompt = PromptBuilder::new(self.prompt_budget_bytes).build_planner(&PlannerInput {
            task: &task.task,
            context: &context,
            constraints: &constraints,
            tools: tools
                .iter()
                .map(|t| ToolSummary {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                })
                .collect(),
        })?;
        let reply = model
            .invoke(&prompt_messages(prompt, "Return the plan as JSON."))
            .context("planner model call")?;
        parse_plan(&reply)
    }
}

/// One step covering the whole task with every registered tool.
pub fn fallback_plan(task: &Task, tools: &ToolRegistry) -> Plan {
    let mut plan = Plan {
        steps: vec![Step {
            step_number: 1,
            objective: task.task.clone(),
            action: "Use available tools as needed".to_string(),
            tools_needed: tools.names().into_iter().map(str::to_string).collect(),
            expected_outcome: "Task completed".to_string(),
            tool_inputs: Default::default(),
        }],
    };
    plan.renumber();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::ToolsConfig;
    use crate::io::prompt::{PLANNER_CONTRACT, PromptRole};
    use crate::test_support::{ScriptedModel, plan_json};

    fn registry() -> ToolRegistry {
        ToolRegistry::from_config(&ToolsConfig::default())
    }

    #[test]
    fn model_plan_is_used() {
        let model = ScriptedModel::new().with_plan(plan_json(3));
        let outcome = PlannerAgent::new(10_000).run(&model, &registry(), &Task::new("do three things"));

        assert_eq!(outcome.source, PlanSource::Model);
        assert_eq!(outcome.plan.len(), 3);
        let calls = model.calls(PromptRole::Planner);
        assert_eq!(calls.len(), 1);
        assert!(calls[0][0].content.contains(PLANNER_CONTRACT));
        assert!(calls[0][0].content.contains("do three things"));
        assert!(calls[0][0].content.contains("execute_command_tool"));
    }

    #[test]
    fn fenced_reply_with_prose_is_accepted() {
        let reply = format!("Here is the plan:\n```json\n{}\n```\nGood luck.", plan_json(2));
        let model = ScriptedModel::new().with_plan(reply);
        let outcome = PlannerAgent::new(10_000).run(&model, &registry(), &Task::new("t"));
        assert_eq!(outcome.plan.len(), 2);
    }

    #[test]
    fn unparseable_reply_falls_back_to_single_step_with_all_tools() {
        let model = ScriptedModel::new().with_plan("I cannot produce JSON today.");
        let tools = registry();
        let outcome = PlannerAgent::new(10_000).run(&model, &tools, &Task::new("tidy the repo"));

        assert!(matches!(outcome.source, PlanSource::Fallback { .. }));
        assert_eq!(outcome.plan.len(), 1);
        let step = &outcome.plan.steps[0];
        assert_eq!(step.objective, "tidy the repo");
        assert_eq!(step.step_number, 1);
        let names: Vec<String> = tools.names().into_iter().map(str::to_string).collect();
        assert_eq!(step.tools_needed, names);
    }

    #[test]
    fn model_error_falls_back() {
        let model = ScriptedModel::new().failing(PromptRole::Planner, "connection refused");
        let outcome = PlannerAgent::new(10_000).run(&model, &registry(), &Task::new("t"));
        match outcome.source {
            PlanSource::Fallback { reason } => assert!(reason.contains("connection refused")),
            PlanSource::Model => panic!("expected fallback"),
        }
    }

    #[test]
    fn schema_violation_falls_back() {
        let model = ScriptedModel::new().with_plan(r#"{"steps": [{"action": "no objective"}]}"#);
        let outcome = PlannerAgent::new(10_000).run(&model, &registry(), &Task::new("t"));
        assert!(matches!(outcome.source, PlanSource::Fallback { .. }));
    }

    #[test]
    fn empty_plan_from_model_is_kept() {
        let model = ScriptedModel::new().with_plan(r#"{"steps": []}"#);
        let outcome = PlannerAgent::new(10_000).run(&model, &registry(), &Task::new("t"));
        assert_eq!(outcome.source, PlanSource::Model);
        assert!(outcome.plan.is_empty());
    }
}
