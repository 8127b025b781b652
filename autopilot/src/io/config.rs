//! Agent configuration stored under `.autopilot/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".autopilot/config.toml";

/// Environment variable consulted when `llm.api_key` is not set.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Agent configuration (TOML).
///
/// Every table is optional; missing fields take the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub behavior: BehaviorConfig,
    pub thresholds: ThresholdsConfig,
    pub executor: ExecutorConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    /// Base URL of an OpenAI-compatible API (no trailing `/chat/completions`).
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Upper bound on a single oracle round trip.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Key from the config file, else from `OPENAI_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Same as [`LlmConfig::resolved_api_key`] with a custom variable lookup.
    pub fn resolve_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        let non_blank = |key: &str| {
            let key = key.trim();
            (!key.is_empty()).then(|| key.to_string())
        };
        self.api_key
            .as_deref()
            .and_then(non_blank)
            .or_else(|| env(API_KEY_ENV).as_deref().and_then(non_blank))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Free-form hint passed to the decider prompt (e.g. `conservative`).
    pub risk_level: String,
    pub humanization: HumanizationConfig,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            risk_level: "conservative".to_string(),
            humanization: HumanizationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HumanizationConfig {
    /// Base pointer travel time in seconds.
    pub mouse_speed: f64,
    /// Offset click targets by a few random pixels.
    pub jitter: bool,
}

impl Default for HumanizationConfig {
    fn default() -> Self {
        Self {
            mouse_speed: 0.5,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub heal_at_hp: u32,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self { heal_at_hp: 40 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Pause between loop cycles.
    pub cycle_pause_ms: u64,
    /// Pause after the perception source returned no frame.
    pub perception_retry_ms: u64,
    /// Extra pause after a `wait` decision.
    pub wait_pause_ms: u64,
    /// Fail the task after this many consecutive unresolved clicks.
    /// Absent means retry indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_click_retries: Option<u32>,
    /// Capacity of the observer broadcast channel.
    pub event_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cycle_pause_ms: 1_000,
            perception_retry_ms: 1_000,
            wait_pause_ms: 2_000,
            max_click_retries: None,
            event_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".autopilot/logs"),
            enabled: true,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model must be non-empty"));
        }
        if !(self.llm.api_base.starts_with("http://") || self.llm.api_base.starts_with("https://"))
        {
            return Err(anyhow!("llm.api_base must be an http(s) URL"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        let speed = self.behavior.humanization.mouse_speed;
        if !speed.is_finite() || speed < 0.0 {
            return Err(anyhow!("behavior.humanization.mouse_speed must be >= 0"));
        }
        if self.executor.cycle_pause_ms == 0 {
            return Err(anyhow!("executor.cycle_pause_ms must be > 0"));
        }
        if self.executor.perception_retry_ms == 0 {
            return Err(anyhow!("executor.perception_retry_ms must be > 0"));
        }
        if self.executor.event_capacity == 0 {
            return Err(anyhow!("executor.event_capacity must be > 0"));
        }
        if self.executor.max_click_retries == Some(0) {
            return Err(anyhow!("executor.max_click_retries must be > 0 when set"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.behavior.risk_level, "conservative");
        assert_eq!(cfg.thresholds.heal_at_hp, 40);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[behavior.humanization]\nmouse_speed = 0.2\n\n[thresholds]\nheal_at_hp = 25\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.behavior.humanization.mouse_speed, 0.2);
        assert!(cfg.behavior.humanization.jitter);
        assert_eq!(cfg.thresholds.heal_at_hp, 25);
        assert_eq!(cfg.llm, LlmConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[executor]\nmax_click_retries = 0\n").expect("write");
        assert!(load_config(&path).is_err());

        fs::write(&path, "[llm]\napi_base = \"ftp://example\"\n").expect("write");
        assert!(load_config(&path).is_err());

        for key in ["cycle_pause_ms", "perception_retry_ms"] {
            fs::write(&path, format!("[executor]\n{key} = 0\n")).expect("write");
            let err = load_config(&path).expect_err("zero pause must be rejected");
            assert!(format!("{err:#}").contains(key), "{err:#}");
        }
    }

    #[test]
    fn blank_key_falls_back_to_environment() {
        let cfg = LlmConfig {
            api_key: Some("  ".to_string()),
            ..LlmConfig::default()
        };
        let env = |name: &str| (name == API_KEY_ENV).then(|| "sk-env".to_string());
        assert_eq!(cfg.resolve_api_key_with(env).as_deref(), Some("sk-env"));
        assert_eq!(cfg.resolve_api_key_with(|_| Some(" ".to_string())), None);

        let configured = LlmConfig {
            api_key: Some("sk-file".to_string()),
            ..LlmConfig::default()
        };
        assert_eq!(configured.resolve_api_key_with(env).as_deref(), Some("sk-file"));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        let mut cfg = AgentConfig::default();
        cfg.executor.max_click_retries = Some(3);
        cfg.llm.api_key = Some("sk-test".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.llm.resolved_api_key().as_deref(), Some("sk-test"));
    }
}
