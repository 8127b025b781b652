//! Perception sources: screen frames and the detectors that read them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::core::snapshot::{ObjectDetection, Snapshot, TextDetection};

/// Opaque pixel buffer handed from capture to detectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Screen capture plus detectors, owned by exactly one executor.
#[async_trait]
pub trait Perception: Send {
    /// Grab the current screen. `None` when no frame is available.
    async fn grab(&mut self) -> Option<Frame>;

    async fn detect_objects(&mut self, frame: &Frame) -> Vec<ObjectDetection>;

    async fn detect_text(&mut self, frame: &Frame) -> Vec<TextDetection>;

    /// Free capture and model resources. Called once when the loop stops.
    async fn release(&mut self) {}
}

/// Perception that replays recorded snapshots from a directory.
///
/// Every `*.json` file in the directory is one [`Snapshot`]; files play in
/// name order and the last one repeats once the recording is exhausted.
#[derive(Debug)]
pub struct ReplayPerception {
    snapshots: Vec<(PathBuf, Snapshot)>,
    cursor: usize,
    current: Option<Snapshot>,
}

impl ReplayPerception {
    pub fn new(snapshots: Vec<Snapshot>) -> Self {
        Self {
            snapshots: snapshots
                .into_iter()
                .map(|snapshot| (PathBuf::new(), snapshot))
                .collect(),
            cursor: 0,
            current: None,
        }
    }

    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("read replay dir {}", dir.display()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("list replay dir {}", dir.display()))?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        if paths.is_empty() {
            bail!("no *.json snapshots in {}", dir.display());
        }

        let mut snapshots = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&contents)
                .with_context(|| format!("parse snapshot {}", path.display()))?;
            snapshots.push((path, snapshot));
        }
        debug!(count = snapshots.len(), "loaded replay snapshots");
        Ok(Self {
            snapshots,
            cursor: 0,
            current: None,
        })
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl Perception for ReplayPerception {
    async fn grab(&mut self) -> Option<Frame> {
        let last = self.snapshots.len().checked_sub(1)?;
        let index = self.cursor.min(last);
        let (path, snapshot) = &self.snapshots[index];
        self.cursor = self.cursor.saturating_add(1);
        self.current = Some(snapshot.clone());
        debug!(frame = index, path = %path.display(), "replaying snapshot");
        Some(Frame {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        })
    }

    async fn detect_objects(&mut self, _frame: &Frame) -> Vec<ObjectDetection> {
        self.current
            .as_ref()
            .map(|snapshot| snapshot.objects.clone())
            .unwrap_or_default()
    }

    async fn detect_text(&mut self, _frame: &Frame) -> Vec<TextDetection> {
        self.current
            .as_ref()
            .map(|snapshot| snapshot.texts.clone())
            .unwrap_or_default()
    }

    async fn release(&mut self) {
        self.current = None;
    }
}
