//! Deterministic, pure logic shared by the planner and executor.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod condition;
pub mod decision;
pub mod geometry;
pub mod plan;
pub mod resolver;
pub mod rules;
pub mod snapshot;
pub mod state;
