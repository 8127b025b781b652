//! One cycle's perception result.

use serde::{Deserialize, Serialize};

use crate::core::geometry::{BoundingBox, Quad};

/// Object detector hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    pub name: String,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub confidence: f64,
}

/// Text detector hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetection {
    pub text: String,
    #[serde(rename = "box")]
    pub quad: Quad,
    #[serde(default)]
    pub confidence: f64,
}

/// Detected objects and text for a single frame.
///
/// Built fresh every cycle and never mutated afterwards; entries keep the
/// detector's order, which target resolution relies on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub objects: Vec<ObjectDetection>,
    #[serde(default)]
    pub texts: Vec<TextDetection>,
}

impl Snapshot {
    pub fn new(objects: Vec<ObjectDetection>, texts: Vec<TextDetection>) -> Self {
        Self { objects, texts }
    }
}
