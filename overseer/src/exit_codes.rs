//! Stable exit codes for the `overseer` CLI.

/// Command succeeded, the session completed, or `check` auto-approved the command.
pub const OK: i32 = 0;
/// Invalid arguments, config or I/O failure.
pub const INVALID: i32 = 1;
/// `overseer run` hit its timeout before the session completed.
pub const TIMED_OUT: i32 = 2;
/// `overseer check` found the command requires human approval.
pub const APPROVAL_REQUIRED: i32 = 3;
