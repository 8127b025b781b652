//! Decision log under `<log.dir>/`.
//!
//! Layout:
//! - `decisions.jsonl`: one [`DecisionRecord`] per decision cycle
//! - `frames/<millis>-<seq>.raw`: the captured frame's raw pixels
//!
//! Records are flat strings so the file stays greppable; `action` is the
//! decision's one-line summary and `screenshot_path` is empty when no pixels
//! were captured.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::decision::ActionDecision;
use crate::io::perception::Frame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub screenshot_path: String,
    pub prompt: String,
    pub response: String,
    pub action: String,
}

#[derive(Debug)]
pub struct DecisionLog {
    records_path: PathBuf,
    frames_dir: PathBuf,
    seq: u64,
}

impl DecisionLog {
    pub const RECORDS_FILE: &'static str = "decisions.jsonl";
    pub const FRAMES_DIR: &'static str = "frames";

    /// Create the log directories if needed.
    pub async fn open(dir: &Path) -> Result<Self> {
        let frames_dir = dir.join(Self::FRAMES_DIR);
        tokio::fs::create_dir_all(&frames_dir)
            .await
            .with_context(|| format!("create log dir {}", frames_dir.display()))?;
        Ok(Self {
            records_path: dir.join(Self::RECORDS_FILE),
            frames_dir,
            seq: 0,
        })
    }

    pub fn records_path(&self) -> &Path {
        &self.records_path
    }

    /// Append one record, dumping the frame first when it carries pixels.
    pub async fn record(
        &mut self,
        frame: Option<&Frame>,
        prompt: &str,
        response: &str,
        action: &ActionDecision,
    ) -> Result<DecisionRecord> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.seq += 1;

        let screenshot_path = match frame.filter(|frame| !frame.pixels.is_empty()) {
            Some(frame) => {
                let path = self
                    .frames_dir
                    .join(format!("{}-{}.raw", now.as_millis(), self.seq));
                tokio::fs::write(&path, &frame.pixels)
                    .await
                    .with_context(|| format!("write frame {}", path.display()))?;
                path.display().to_string()
            }
            None => String::new(),
        };

        let record = DecisionRecord {
            timestamp: now.as_secs_f64(),
            screenshot_path,
            prompt: prompt.to_string(),
            response: response.to_string(),
            action: action.to_string(),
        };
        let mut line = serde_json::to_string(&record).context("serialize decision record")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.records_path)
            .await
            .with_context(|| format!("open {}", self.records_path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("append {}", self.records_path.display()))?;
        file.flush().await?;
        debug!(seq = self.seq, action = %record.action, "decision recorded");
        Ok(record)
    }
}

/// Read every record from a `decisions.jsonl` file.
pub async fn read_records(path: &Path) -> Result<Vec<DecisionRecord>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} record {}", path.display(), index + 1))
        })
        .collect()
}
