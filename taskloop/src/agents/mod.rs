//! Planner, executor and reviewer agents, plus the single-shot code assistant.
//!
//! Each loop agent renders its prompt, calls the model and turns the reply into
//! something the controller can apply to `AgentState`.

use crate::core::types::Message;

pub mod assistant;
pub mod executor;
pub mod planner;
pub mod reviewer;

/// A rendered system prompt followed by a one-line directive.
pub(crate) fn prompt_messages(system: String, directive: impl Into<String>) -> Vec<Message> {
    vec![Message::system(system), Message::user(directive)]
}
