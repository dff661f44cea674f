//! Executor agent: runs the tools for the current step and records a report.

use tracing::{debug, info, instrument, warn};

use crate::core::transitions::{StepGate, open_step};
use crate::core::types::{AgentState, Step};
use crate::io::model::LanguageModel;
use crate::io::prompt::{ExecutorInput, PromptBuilder, ToolRun};
use crate::io::tools::{ToolArgs, ToolRegistry};

use super::prompt_messages;

#[derive(Debug, Clone)]
pub struct ExecutorAgent {
    prompt_budget_bytes: usize,
}

impl ExecutorAgent {
    pub fn new(prompt_budget_bytes: usize) -> Self {
        Self {
            prompt_budget_bytes,
        }
    }

    /// Execute `plan.steps[current_step]`, if the state allows it.
    ///
    /// Appends a `user` instruction and one `assistant` entry with the tool
    /// outputs and the model's report. Model failures are folded into that
    /// entry; nothing is returned as an error.
    #[instrument(skip_all, fields(current_step = state.current_step))]
    pub fn run<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        tools: &ToolRegistry,
        state: &mut AgentState,
    ) -> StepGate {
        let gate = open_step(state);
        let StepGate::Ready(index) = gate else {
            debug!(status = state.status.as_str(), "no step to execute");
            return gate;
        };
        let Some(step) = state.plan.as_ref().and_then(|p| p.steps.get(index)).cloned() else {
            return StepGate::Closed;
        };
        let total = state.step_count();
        info!(step = index + 1, total, objective = %step.objective, "executing step");

        state.push_user(instruction(&step, index, total));
        let runs = run_tools(tools, &step);

        let report = match PromptBuilder::new(self.prompt_budget_bytes).build_executor(&ExecutorInput {
            task: &state.task,
            step: &step,
            total,
            history: &state.messages,
            tool_runs: &runs,
        }) {
            Ok(prompt) => model
                .invoke(&prompt_messages(prompt, format!("Report on step {}.", index + 1)))
                .unwrap_or_else(|err| {
                    warn!(err = %format!("{err:#}"), "executor model call failed");
                    format!("[model error: {err:#}]")
                }),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "executor prompt failed");
                format!("[model error: {err:#}]")
            }
        };

        state.push_assistant(step_entry(index, &runs, report.trim()));
        gate
    }
}

fn instruction(step: &Step, index: usize, total: usize) -> String {
    let mut text = format!("Execute step {} of {total}: {}", index + 1, step.objective);
    if !step.action.is_empty() {
        text.push_str(&format!("\nAction: {}", step.action));
    }
    if !step.tools_needed.is_empty() {
        text.push_str(&format!("\nTools: {}", step.tools_needed.join(", ")));
    }
    text
}

/// Invoke each named tool in order; unknown names are skipped.
fn run_tools(tools: &ToolRegistry, step: &Step) -> Vec<ToolRun> {
    let empty = ToolArgs::new();
    step.tools_needed
        .iter()
        .filter_map(|name| {
            let args = step.tool_inputs.get(name).unwrap_or(&empty);
            match tools.invoke(name, args) {
                Some(output) => Some(ToolRun {
                    tool: name.clone(),
                    output,
                }),
                None => {
                    debug!(tool = %name, "skipping unknown tool");
                    None
                }
            }
        })
        .collect()
}

fn step_entry(index: usize, runs: &[ToolRun], report: &str) -> String {
    let mut entry = format!("Step {} result:", index + 1);
    for run in runs {
        entry.push_str(&format!("\n[{}]\n{}", run.tool, run.output.trim_end()));
    }
    entry.push_str(&format!("\nReport: {report}"));
    entry
}
