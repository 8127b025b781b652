//! CLI tests for `autopilot rules` and config handling.
//!
//! Spawns the autopilot binary and verifies exit codes and printed outcomes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use autopilot::exit_codes;
use autopilot::io::config::{AgentConfig, write_config};

const RULES: &str = r#"
[[rule]]
action = "heal"
[rule.trigger]
hp = "< {{ thresholds.heal_at_hp }}"

[[rule]]
action = "retreat"
[rule.trigger]
hp = "<60"

[[rule]]
action = "broken"
[rule.trigger]
hp = ">="
"#;

fn autopilot(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_autopilot"))
        .current_dir(dir)
        .env_remove("OPENAI_API_KEY")
        .args(args)
        .output()
        .expect("run autopilot")
}

fn setup(heal_at_hp: u32) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cfg = AgentConfig::default();
    cfg.thresholds.heal_at_hp = heal_at_hp;
    write_config(&temp.path().join("config.toml"), &cfg).expect("write config");
    fs::write(temp.path().join("rules.toml"), RULES).expect("write rules");
    temp
}

#[test]
fn first_matching_rule_fires() {
    let temp = setup(30);
    let output = autopilot(
        temp.path(),
        &["--config", "config.toml", "rules", "--file", "rules.toml", "hp=20"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("#0 heal: matched (fires)"), "{stdout}");
    assert!(stdout.contains("#1 retreat: matched (shadowed)"), "{stdout}");
    assert!(stdout.contains("#2 broken: malformed"), "{stdout}");
}

#[test]
fn threshold_comes_from_config() {
    let temp = setup(10);
    let output = autopilot(
        temp.path(),
        &["--config", "config.toml", "rules", "--file", "rules.toml", "hp=20"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("#0 heal: not matched"), "{stdout}");
    assert!(stdout.contains("#1 retreat: matched (fires)"), "{stdout}");
}

#[test]
fn no_match_and_missing_key_exit_with_no_match() {
    let temp = setup(30);
    let output = autopilot(
        temp.path(),
        &["--config", "config.toml", "rules", "--file", "rules.toml", "hp=80"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::NO_MATCH));

    let output = autopilot(
        temp.path(),
        &["--config", "config.toml", "rules", "--file", "rules.toml", "mana=5"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::NO_MATCH));
}

#[test]
fn invalid_config_is_rejected() {
    let temp = setup(30);
    fs::write(
        temp.path().join("config.toml"),
        "[llm]\ntimeout_secs = 0\n",
    )
    .expect("write config");
    let output = autopilot(
        temp.path(),
        &["--config", "config.toml", "rules", "--file", "rules.toml", "hp=20"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("timeout_secs"));
}

#[test]
fn plan_without_api_key_fails_cleanly() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = autopilot(temp.path(), &["plan", "Open Chrome"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("API key"));
}
