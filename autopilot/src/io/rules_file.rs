//! Reflex rules file (TOML rendered as a minijinja template).
//!
//! ```toml
//! [[rule]]
//! action = "press_r"
//! [rule.trigger]
//! hp = "< {{ thresholds.heal_at_hp }}"
//! ```
//!
//! The whole configuration is in scope while rendering, so thresholds can be
//! tuned in `config.toml` without touching the rules.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use minijinja::Environment;
use serde::Deserialize;

use crate::core::condition::Scalar;
use crate::core::rules::{RuleSpec, StateMap};
use crate::io::config::AgentConfig;

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleSpec>,
}

/// Render and parse rules from source text.
pub fn parse_rules(source: &str, cfg: &AgentConfig) -> Result<Vec<RuleSpec>> {
    let env = Environment::new();
    let rendered = env
        .render_str(source, cfg)
        .context("render rules template")?;
    let file: RulesFile = toml::from_str(&rendered).context("parse rules toml")?;
    Ok(file.rules)
}

pub fn load_rules(path: &Path, cfg: &AgentConfig) -> Result<Vec<RuleSpec>> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_rules(&source, cfg).with_context(|| format!("load rules {}", path.display()))
}

/// Parse `KEY=VALUE` assignments into a state map.
///
/// `true`/`false` become booleans, numeric text becomes a number, anything
/// else stays text.
pub fn parse_state<I, S>(assignments: I) -> Result<StateMap>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut state = StateMap::new();
    for assignment in assignments {
        let assignment = assignment.as_ref();
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got `{assignment}`"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("empty key in `{assignment}`"));
        }
        state.insert(key.to_string(), parse_scalar(value.trim()));
    }
    Ok(state)
}

fn parse_scalar(raw: &str) -> Scalar {
    match raw {
        "true" => Scalar::Bool(true),
        "false" => Scalar::Bool(false),
        _ => raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map_or_else(|| Scalar::Text(raw.to_string()), Scalar::Number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::condition::ConditionSpec;
    use crate::core::rules::RuleEngine;

    const RULES: &str = r#"
[[rule]]
action = "press_r"
[rule.trigger]
hp = "< {{ thresholds.heal_at_hp }}"

[[rule]]
action = "click: Retreat"
[rule.trigger]
hp = ["<", 60]
in_combat = true
"#;

    #[test]
    fn thresholds_render_into_operands() {
        let mut cfg = AgentConfig::default();
        cfg.thresholds.heal_at_hp = 30;
        let rules = parse_rules(RULES, &cfg).expect("rules");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].trigger["hp"], ConditionSpec::from("< 30"));

        let engine = RuleEngine::with_rules(&rules);
        let state = parse_state(["hp=20", "in_combat=true"]).expect("state");
        assert_eq!(engine.evaluate(&state), Some("press_r"));
        let state = parse_state(["hp=50", "in_combat=true"]).expect("state");
        assert_eq!(engine.evaluate(&state), Some("click: Retreat"));
        let state = parse_state(["hp=50", "in_combat=false"]).expect("state");
        assert_eq!(engine.evaluate(&state), None);
    }

    #[test]
    fn empty_file_has_no_rules() {
        let rules = parse_rules("", &AgentConfig::default()).expect("rules");
        assert!(rules.is_empty());
    }

    #[test]
    fn load_reports_path_on_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("rules.toml");
        std::fs::write(&path, "[[rule]]\ntrigger = 3\n").expect("write");
        let err = load_rules(&path, &AgentConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("rules.toml"));
    }

    #[test]
    fn state_values_are_typed() {
        let state = parse_state(["hp=20", "zone = Town", "alive=true"]).expect("state");
        assert_eq!(state["hp"], Scalar::Number(20.0));
        assert_eq!(state["zone"], Scalar::Text("Town".to_string()));
        assert_eq!(state["alive"], Scalar::Bool(true));
        assert!(parse_state(["hp"]).is_err());
        assert!(parse_state(["=1"]).is_err());
    }
}
