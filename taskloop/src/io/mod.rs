//! Side-effecting operations: configuration, subprocesses, models and tools.

pub mod config;
pub mod model;
pub mod offline;
pub mod process;
pub mod prompt;
pub mod tools;
