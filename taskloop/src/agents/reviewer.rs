//! Reviewer agent: judges the step just executed.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::parse::parse_review_decision;
use crate::core::types::{AgentState, ReviewVerdict};
use crate::io::model::LanguageModel;
use crate::io::prompt::{PromptBuilder, ReviewerInput};

use super::prompt_messages;

#[derive(Debug, Clone)]
pub struct ReviewerAgent {
    prompt_budget_bytes: usize,
    review_window: usize,
}

impl ReviewerAgent {
    pub fn new(prompt_budget_bytes: usize, review_window: usize) -> Self {
        Self {
            prompt_budget_bytes,
            review_window,
        }
    }

    /// Ask the model whether the step at `current_step` is done.
    ///
    /// An unreadable reply becomes [`ReviewVerdict::Fallback`]; a failed model
    /// call is returned as an error.
    #[instrument(skip_all, fields(current_step = state.current_step, window = self.review_window))]
    pub fn run<M: LanguageModel + ?Sized>(&self, model: &M, state: &AgentState) -> Result<ReviewVerdict> {
        let step = state
            .plan
            .as_ref()
            .and_then(|p| p.steps.get(state.current_step))
            .ok_or_else(|| anyhow!("no step {} to review", state.current_step))?;
        let prompt = PromptBuilder::new(self.prompt_budget_bytes).build_reviewer(&ReviewerInput {
            task: &state.task,
            step,
            total: state.step_count(),
            recent: state.trailing_messages(self.review_window),
        })?;
        let reply = model
            .invoke(&prompt_messages(prompt, "Return your decision as JSON."))
            .context("reviewer model call")?;

        match parse_review_decision(&reply) {
            Ok(decision) => {
                debug!(
                    step_completed = decision.step_completed,
                    next_action = ?decision.next_action,
                    "review decision"
                );
                Ok(ReviewVerdict::Decision(decision))
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "unreadable review, advancing optimistically");
                Ok(ReviewVerdict::Fallback { raw: reply })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transitions::apply_plan;
    use crate::core::types::{NextAction, Task};
    use crate::io::prompt::PromptRole;
    use crate::test_support::{ScriptedModel, plan, review_json};

    fn executing_with_transcript() -> AgentState {
        let mut state = AgentState::new(&Task::new("t"));
        apply_plan(&mut state, plan(2));
        for i in 0..5 {
            state.push_assistant(format!("entry {i}"));
        }
        state
    }

    #[test]
    fn decision_is_parsed() {
        let model = ScriptedModel::new().with_review(review_json(false, "retry"));
        let verdict = ReviewerAgent::new(10_000, 3)
            .run(&model, &executing_with_transcript())
            .expect("review");
        match verdict {
            ReviewVerdict::Decision(d) => {
                assert!(!d.step_completed);
                assert_eq!(d.next_action, NextAction::Retry);
            }
            ReviewVerdict::Fallback { .. } => panic!("expected decision"),
        }
    }

    #[test]
    fn only_trailing_window_is_shown() {
        let model = ScriptedModel::new();
        ReviewerAgent::new(10_000, 3)
            .run(&model, &executing_with_transcript())
            .expect("review");
        let prompt = &model.calls(PromptRole::Reviewer)[0][0].content;
        assert!(prompt.contains("entry 4"));
        assert!(prompt.contains("entry 2"));
        assert!(!prompt.contains("entry 1"));
        assert!(prompt.contains("Reviewing step 1 of 2."));
    }

    #[test]
    fn unreadable_reply_is_fallback() {
        let model = ScriptedModel::new().with_review("Looks fine to me!");
        let verdict = ReviewerAgent::new(10_000, 3)
            .run(&model, &executing_with_transcript())
            .expect("review");
        assert_eq!(
            verdict,
            ReviewVerdict::Fallback {
                raw: "Looks fine to me!".to_string()
            }
        );
    }

    #[test]
    fn transport_error_propagates() {
        let model = ScriptedModel::new().failing(PromptRole::Reviewer, "timeout");
        let err = ReviewerAgent::new(10_000, 3)
            .run(&model, &executing_with_transcript())
            .unwrap_err();
        assert!(format!("{err:#}").contains("reviewer model call"));
    }
}
