//! Drives one task through `planning → executing → completed | error`.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::agents::executor::ExecutorAgent;
use crate::agents::planner::{PlanSource, PlannerAgent};
use crate::agents::reviewer::ReviewerAgent;
use crate::core::invariants::validate_state;
use crate::core::transitions::{ReviewTransition, StepGate, apply_plan, apply_review, fail};
use crate::core::types::{AgentState, AgentStatus, Task};
use crate::io::config::LoopConfig;
use crate::io::model::LanguageModel;
use crate::io::tools::ToolRegistry;
use crate::response::AgentResponse;

/// Owns the `AgentState` for one execution and sequences the agents.
///
/// The model and tool registry are borrowed; the controller holds no global state,
/// so independent executions can run side by side.
pub struct Controller<'a, M: LanguageModel + ?Sized> {
    model: &'a M,
    tools: &'a ToolRegistry,
    planner: PlannerAgent,
    executor: ExecutorAgent,
    reviewer: ReviewerAgent,
    limits: LoopConfig,
    task: Task,
    state: AgentState,
    /// Executor runs of the step at `current_step`.
    attempts: u32,
    /// Executor runs across all steps.
    iterations: u32,
}

impl<'a, M: LanguageModel + ?Sized> Controller<'a, M> {
    pub fn new(model: &'a M, tools: &'a ToolRegistry, limits: &LoopConfig, task: Task) -> Self {
        Self {
            model,
            tools,
            planner: PlannerAgent::new(limits.prompt_budget_bytes),
            executor: ExecutorAgent::new(limits.prompt_budget_bytes),
            reviewer: ReviewerAgent::new(limits.prompt_budget_bytes, limits.review_window),
            limits: limits.clone(),
            state: AgentState::new(&task),
            task,
            attempts: 0,
            iterations: 0,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn into_state(self) -> AgentState {
        self.state
    }

    /// Advance by one phase. A no-op once the state is terminal.
    pub fn step_once(&mut self) -> Result<()> {
        match self.state.status {
            AgentStatus::Completed | AgentStatus::Error => return Ok(()),
            AgentStatus::Planning => self.plan(),
            AgentStatus::Executing => self.execute_and_review()?,
        }
        for violation in validate_state(&self.state) {
            warn!(%violation, "state invariant violated");
        }
        Ok(())
    }

    /// Step until terminal. Errors are returned as-is; see [`Controller::run`].
    pub fn drive(&mut self) -> Result<()> {
        while !self.state.status.is_terminal() {
            self.step_once()?;
        }
        Ok(())
    }

    /// Run to completion and build the response. Never fails.
    #[instrument(skip_all, fields(task_len = self.task.task.len()))]
    pub fn run(mut self) -> AgentResponse {
        match self.drive() {
            Ok(()) => {
                info!(
                    status = self.state.status.as_str(),
                    steps = self.state.step_count(),
                    results = self.state.results.len(),
                    iterations = self.iterations,
                    "execution finished"
                );
                AgentResponse::from_state(self.state)
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "execution aborted");
                AgentResponse::failure(format!("{err:#}"))
            }
        }
    }

    fn plan(&mut self) {
        let outcome = self.planner.run(self.model, self.tools, &self.task);
        if let PlanSource::Fallback { reason } = &outcome.source {
            debug!(%reason, "installing fallback plan");
        }
        apply_plan(&mut self.state, outcome.plan);
    }

    fn execute_and_review(&mut self) -> Result<()> {
        let limit = self.limits.iteration_limit(self.state.step_count());
        if self.iterations >= limit {
            fail(
                &mut self.state,
                format!("Execution stopped: iteration limit of {limit} reached"),
            );
            return Ok(());
        }

        let StepGate::Ready(index) = self.executor.run(self.model, self.tools, &mut self.state) else {
            return Ok(());
        };
        self.iterations += 1;
        self.attempts += 1;

        let verdict = self.reviewer.run(self.model, &self.state)?;
        match apply_review(&mut self.state, &verdict) {
            ReviewTransition::Advanced => self.attempts = 0,
            ReviewTransition::Repeat if self.attempts >= self.limits.max_step_attempts => {
                fail(
                    &mut self.state,
                    format!(
                        "Step {} failed after {} attempts",
                        index + 1,
                        self.attempts
                    ),
                );
            }
            ReviewTransition::Repeat => {
                debug!(step = index + 1, attempts = self.attempts, "repeating step");
            }
            ReviewTransition::Finished | ReviewTransition::Ignored => {}
        }
        Ok(())
    }
}

/// Execute `task` end to end with an injected model and tool registry.
pub fn run_task<M: LanguageModel + ?Sized>(
    model: &M,
    tools: &ToolRegistry,
    limits: &LoopConfig,
    task: Task,
) -> AgentResponse {
    Controller::new(model, tools, limits, task).run()
}
