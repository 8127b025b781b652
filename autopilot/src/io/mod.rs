//! Side-effecting collaborators: files, network, screen and input devices.

pub mod actuator;
pub mod config;
pub mod decision_log;
pub mod llm;
pub mod oracle;
pub mod perception;
pub mod prompt;
pub mod rules_file;
