//! Stable exit codes for `pev` commands.

/// Command succeeded; for `pev check`, every check passed.
pub const OK: i32 = 0;
/// Invalid input: unreadable files, schema violations, bad config.
pub const INVALID: i32 = 1;
/// `pev check` evaluated the checks and at least one failed.
pub const CHECKS_FAILED: i32 = 2;
