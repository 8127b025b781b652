//! Stable exit codes for autopilot CLI commands.

/// Command succeeded; for `run`, every task was resolved.
pub const OK: i32 = 0;
/// Command failed due to invalid config, rules, replay data or other errors.
pub const INVALID: i32 = 1;
/// `autopilot run` was stopped before the plan was exhausted.
pub const STOPPED: i32 = 2;
/// `autopilot rules` found no matching rule.
pub const NO_MATCH: i32 = 3;
