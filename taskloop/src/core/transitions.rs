//! Controller-owned state transitions for `AgentState`.
//!
//! Every function here is a no-op on a terminal state, which is what makes
//! `completed` and `error` absorbing.

use crate::core::types::{
    AgentState, AgentStatus, Message, NextAction, Plan, ReviewVerdict, StepResult, StepStatus,
};

/// Whether the executor may run a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepGate {
    /// Zero-based index of the step to run.
    Ready(usize),
    /// The state is (now) terminal.
    Closed,
}

/// Effect of a review on the controller's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewTransition {
    /// `current_step` moved forward; execution continues.
    Advanced,
    /// The same step runs again.
    Repeat,
    /// The state became terminal.
    Finished,
    /// The state was already terminal; nothing changed.
    Ignored,
}

/// Install the plan and enter `executing`.
pub fn apply_plan(state: &mut AgentState, plan: Plan) {
    if state.status != AgentStatus::Planning {
        return;
    }
    state.messages.push(Message::assistant(format!(
        "Planning completed, {} steps",
        plan.len()
    )));
    state.plan = Some(plan);
    state.status = AgentStatus::Executing;
}

/// Check executor preconditions in order: usable plan, then steps remaining.
pub fn open_step(state: &mut AgentState) -> StepGate {
    if state.status.is_terminal() {
        return StepGate::Closed;
    }
    let total = match &state.plan {
        Some(plan) if !plan.is_empty() => plan.len(),
        Some(_) => {
            fail(state, "Execution failed: the plan has no steps");
            return StepGate::Closed;
        }
        None => {
            fail(state, "Execution failed: no plan is available");
            return StepGate::Closed;
        }
    };
    if state.current_step >= total {
        state.push_assistant(format!("All {total} steps completed"));
        state.status = AgentStatus::Completed;
        return StepGate::Closed;
    }
    StepGate::Ready(state.current_step)
}

/// Apply a reviewer verdict for the step at `current_step`.
pub fn apply_review(state: &mut AgentState, verdict: &ReviewVerdict) -> ReviewTransition {
    if state.status.is_terminal() {
        return ReviewTransition::Ignored;
    }
    let total = state.step_count();
    let reviewed = state.current_step;

    match verdict {
        ReviewVerdict::Decision(decision) => {
            if decision.step_completed {
                let result = state
                    .messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                state.results.push(StepResult {
                    step: reviewed,
                    status: StepStatus::Completed,
                    result,
                });
                state.current_step += 1;
            }

            if decision.next_action == NextAction::End || state.current_step >= total {
                state.push_assistant(format!(
                    "Task completed after step {} of {total}: {}",
                    reviewed + 1,
                    decision.reason
                ));
                state.status = AgentStatus::Completed;
                return ReviewTransition::Finished;
            }

            if decision.step_completed {
                state.push_assistant(format!(
                    "Step {} completed; moving to step {} of {total}",
                    reviewed + 1,
                    state.current_step + 1
                ));
                ReviewTransition::Advanced
            } else {
                state.push_assistant(format!(
                    "Step {} not completed, running it again: {}",
                    reviewed + 1,
                    decision.reason
                ));
                ReviewTransition::Repeat
            }
        }
        ReviewVerdict::Fallback { .. } => {
            state.current_step += 1;
            if state.current_step >= total {
                state.push_assistant(format!(
                    "Review of step {} was unreadable; treating it as done. All {total} steps processed",
                    reviewed + 1
                ));
                state.status = AgentStatus::Completed;
                ReviewTransition::Finished
            } else {
                state.push_assistant(format!(
                    "Review of step {} was unreadable; treating it as done and moving to step {} of {total}",
                    reviewed + 1,
                    state.current_step + 1
                ));
                ReviewTransition::Advanced
            }
        }
    }
}

/// Enter `error` with a diagnostic transcript entry.
pub fn fail(state: &mut AgentState, reason: impl Into<String>) {
    if state.status.is_terminal() {
        return;
    }
    state.push_assistant(reason);
    state.status = AgentStatus::Error;
}
