//! Stable exit codes for `taskloop` CLI commands.

/// Command succeeded; for `run`, the task completed.
pub const OK: i32 = 0;
/// `taskloop run` finished but the execution did not complete.
pub const FAILED: i32 = 1;
/// Invalid arguments or config, or another error before execution.
pub const INVALID: i32 = 2;
