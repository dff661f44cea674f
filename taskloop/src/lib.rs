//! Plan–execute–review task loop.
//!
//! A natural-language task is turned into a step plan by a language model,
//! each step is carried out with a fixed toolbox (file I/O, text search,
//! command execution), and a reviewer decides after every step whether to
//! advance, repeat or stop. The crate is layered:
//!
//! - **[`core`]**: Pure state, parsing and transitions. No I/O.
//! - **[`io`]**: Config, subprocesses, language-model backends, prompts and tools.
//! - **[`agents`]**: Planner, executor and reviewer built on `io`.
//!
//! [`controller`] sequences the agents for one task and returns an
//! [`response::AgentResponse`].

pub mod agents;
pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod response;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
