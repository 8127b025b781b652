//! Typed oracle output and the strict parsers that produce it.
//!
//! Oracle replies are free-form text that should contain JSON, sometimes
//! wrapped in Markdown code fences. [`strip_code_fences`] is the only place
//! that cleans raw text; everything else parses the cleaned payload strictly.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::geometry::Coordinates;

/// Physical action the executor can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[serde(alias = "Click", alias = "CLICK")]
    Click,
    #[serde(alias = "Type", alias = "TYPE")]
    Type,
    #[serde(alias = "Press", alias = "PRESS")]
    Press,
    #[serde(alias = "Wait", alias = "WAIT")]
    Wait,
    #[serde(alias = "Finish", alias = "FINISH")]
    Finish,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Press => "press",
            ActionKind::Wait => "wait",
            ActionKind::Finish => "finish",
        }
    }
}

/// Where an action is aimed: literal pixels or a description to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Coordinates(Coordinates),
    Symbol(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Coordinates(coords) => write!(f, "{coords}"),
            Target::Symbol(symbol) => write!(f, "'{symbol}'"),
        }
    }
}

/// Next action chosen for the current task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub action: ActionKind,
    #[serde(default)]
    pub target: Option<Target>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl ActionDecision {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            target: None,
            value: None,
            reasoning: String::new(),
        }
    }

    /// Safe no-op decision.
    pub fn wait(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            ..Self::new(ActionKind::Wait)
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Decision standing in for a reflex rule's action name.
    ///
    /// `click:<target>`, `type:<text>` and `press:<key>` carry an argument;
    /// `wait` and `finish` map directly; any other name is pressed as a key.
    pub fn from_reflex(name: &str) -> Self {
        let name = name.trim();
        let reasoning = format!("reflex rule '{name}'");
        let decision = match name.split_once(':') {
            Some((verb, arg)) => match verb.trim().to_ascii_lowercase().as_str() {
                "click" => Self::new(ActionKind::Click).with_target(Target::Symbol(arg.trim().to_string())),
                "type" => Self::new(ActionKind::Type).with_value(arg.trim()),
                "press" => Self::new(ActionKind::Press).with_value(arg.trim()),
                _ => Self::new(ActionKind::Press).with_value(name),
            },
            None => match name.to_ascii_lowercase().as_str() {
                "wait" => Self::new(ActionKind::Wait),
                "finish" => Self::new(ActionKind::Finish),
                _ => Self::new(ActionKind::Press).with_value(name),
            },
        };
        decision.with_reasoning(reasoning)
    }
}

/// One-line summary: the action, then its target and value when present
/// (`type 'Search' "chrome"`).
impl std::fmt::Display for ActionDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action.as_str())?;
        if let Some(target) = &self.target {
            write!(f, " {target}")?;
        }
        if let Some(value) = &self.value {
            write!(f, " {value:?}")?;
        }
        Ok(())
    }
}

/// Why an oracle reply could not be turned into a typed value.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty response")]
    Empty,
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("response does not match the expected shape: {0}")]
    Shape(String),
}

/// Extract the JSON payload from a reply that may be wrapped in code fences.
pub fn strip_code_fences(raw: &str) -> &str {
    static FENCED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence regex is valid")
    });
    match FENCED_RE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim(),
        None => raw.trim().trim_matches('`').trim(),
    }
}

/// Parse an action decision.
pub fn parse_decision(raw: &str) -> Result<ActionDecision, ParseError> {
    let value = parse_json(raw)?;
    if !value.is_object() {
        return Err(ParseError::Shape("expected a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|err| ParseError::Shape(err.to_string()))
}

/// Parse a plan decomposition: a non-empty JSON array of task strings.
///
/// Blank entries are dropped; an array that is empty after that is rejected
/// so the caller can fall back to the undecomposed goal.
pub fn parse_task_list(raw: &str) -> Result<Vec<String>, ParseError> {
    let value = parse_json(raw)?;
    let items = value
        .as_array()
        .ok_or_else(|| ParseError::Shape("expected a JSON array".to_string()))?;
    let mut tasks = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let text = item
            .as_str()
            .ok_or_else(|| ParseError::Shape(format!("item {index} is not a string")))?;
        let text = text.trim();
        if !text.is_empty() {
            tasks.push(text.to_string());
        }
    }
    if tasks.is_empty() {
        return Err(ParseError::Shape("task list is empty".to_string()));
    }
    Ok(tasks)
}

fn parse_json(raw: &str) -> Result<serde_json::Value, ParseError> {
    let payload = strip_code_fences(raw);
    if payload.is_empty() {
        return Err(ParseError::Empty);
    }
    serde_json::from_str(payload).map_err(ParseError::InvalidJson)
}
