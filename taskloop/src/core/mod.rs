//! Deterministic, pure logic for the task loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod invariants;
pub mod parse;
pub mod transitions;
pub mod types;
