//! Goal-driven screen autopilot.
//!
//! A natural-language goal is decomposed into tasks, then an executor loop
//! repeatedly looks at the screen, picks the next action (reflex rules first,
//! then a reasoning oracle) and drives pointer and keyboard until every task
//! is resolved or a stop is requested.
//!
//! - **[`core`]**: Pure, deterministic logic (conditions, rules, plan,
//!   target resolution, decision parsing). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (config and rules files, the
//!   LLM client, perception sources, actuators, the decision log).
//!
//! Orchestration modules ([`planner`], [`executor`], [`events`]) tie the two
//! together.

pub mod core;
pub mod events;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod planner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
