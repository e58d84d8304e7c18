//! Exit code constants for the pushlock CLI.
//!
//! - 0: Success
//! - 1: Failure, or "no changes" for `has-changes`

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Any failure (lock timeout, git conflict, bad arguments), or a negative
/// answer from a query command such as `has-changes`.
pub const FAILURE: i32 = 1;
