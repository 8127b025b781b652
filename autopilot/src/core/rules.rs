//! Deterministic reflex rules evaluated before the decision oracle.
//!
//! Rules are checked in load order and the first full match wins. Evaluation
//! is total: a rule that cannot be evaluated is reported as
//! [`RuleOutcome::Malformed`] and skipped, never surfaced as an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::condition::{Condition, ConditionError, ConditionSpec, Scalar};

/// Flat per-cycle state the rules are evaluated against.
pub type StateMap = BTreeMap<String, Scalar>;

/// Rule as written in a rules file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default)]
    pub trigger: BTreeMap<String, ConditionSpec>,
    pub action: String,
}

impl RuleSpec {
    pub fn new<K, C>(trigger: impl IntoIterator<Item = (K, C)>, action: &str) -> Self
    where
        K: Into<String>,
        C: Into<ConditionSpec>,
    {
        Self {
            trigger: trigger
                .into_iter()
                .map(|(key, spec)| (key.into(), spec.into()))
                .collect(),
            action: action.to_string(),
        }
    }
}

/// Result of checking one rule against a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Matched,
    NotMatched,
    Malformed(String),
}

/// Diagnostic line for one rule, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleReport {
    pub index: usize,
    pub action: String,
    pub outcome: RuleOutcome,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    action: String,
    body: Result<Vec<(String, Condition)>, String>,
}

impl CompiledRule {
    fn compile(spec: &RuleSpec) -> Self {
        let body = if spec.action.trim().is_empty() {
            Err("rule has an empty action".to_string())
        } else {
            spec.trigger
                .iter()
                .map(|(key, condition)| {
                    Condition::parse(condition)
                        .map(|parsed| (key.clone(), parsed))
                        .map_err(|err: ConditionError| format!("{key}: {err}"))
                })
                .collect()
        };
        Self {
            action: spec.action.trim().to_string(),
            body,
        }
    }

    fn check(&self, state: &StateMap) -> RuleOutcome {
        let conditions = match &self.body {
            Ok(conditions) => conditions,
            Err(reason) => return RuleOutcome::Malformed(reason.clone()),
        };
        let all = conditions.iter().all(|(key, condition)| {
            state
                .get(key)
                .is_some_and(|observed| condition.evaluate(observed))
        });
        if all {
            RuleOutcome::Matched
        } else {
            RuleOutcome::NotMatched
        }
    }
}

/// Ordered reflex rule set.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: &[RuleSpec]) -> Self {
        let mut engine = Self::new();
        engine.load(rules);
        engine
    }

    /// Replace the active rule set. Malformed rules are kept (so indices
    /// line up with the source) but never match.
    pub fn load(&mut self, rules: &[RuleSpec]) {
        self.rules = rules.iter().map(CompiledRule::compile).collect();
        for (index, rule) in self.rules.iter().enumerate() {
            if let Err(reason) = &rule.body {
                warn!(index, action = %rule.action, %reason, "malformed rule will never match");
            }
        }
        debug!(count = self.rules.len(), "rules loaded");
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Action of the first matching rule, if any.
    pub fn evaluate(&self, state: &StateMap) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.check(state) == RuleOutcome::Matched)
            .map(|rule| rule.action.as_str())
    }

    /// Outcome of every rule against `state`, in priority order.
    pub fn explain(&self, state: &StateMap) -> Vec<RuleReport> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, rule)| RuleReport {
                index,
                action: rule.action.clone(),
                outcome: rule.check(state),
            })
            .collect()
    }
}
