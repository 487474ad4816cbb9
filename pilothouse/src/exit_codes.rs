//! Stable exit codes for pilothouse CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Stack not running when required, MySQL never became ready, or any other error.
pub const FAILURE: i32 = 1;
