//! Structural invariants of `AgentState` not enforced by the type system.

use crate::core::types::{AgentState, AgentStatus, Role};

/// Check invariants that must hold after every controller transition:
/// - `current_step <= len(plan.steps)`
/// - `len(results) <= current_step`, with strictly increasing step indices below it
/// - a non-empty plan whose steps are exhausted is not still `executing`
/// - the transcript holds only `user`/`assistant` entries
pub fn validate_state(state: &AgentState) -> Vec<String> {
    let mut errors = Vec::new();
    let total = state.step_count();

    if state.current_step > total {
        errors.push(format!(
            "current_step {} exceeds plan length {}",
            state.current_step, total
        ));
    }

    if state.results.len() > state.current_step {
        errors.push(format!(
            "{} results recorded but current_step is {}",
            state.results.len(),
            state.current_step
        ));
    }

    if !state
        .results
        .windows(2)
        .all(|pair| pair[0].step < pair[1].step)
    {
        errors.push("results must be recorded in increasing step order".to_string());
    }

    if let Some(last) = state.results.last()
        && last.step >= state.current_step
    {
        errors.push(format!(
            "result for step {} recorded at or beyond current_step {}",
            last.step, state.current_step
        ));
    }

    if total > 0 && state.current_step >= total && state.status == AgentStatus::Executing {
        errors.push("all steps consumed but status is still executing".to_string());
    }

    if state.messages.iter().any(|m| m.role == Role::System) {
        errors.push("transcript contains a system message".to_string());
    }

    errors
}
