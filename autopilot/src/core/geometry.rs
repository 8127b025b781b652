//! Screen geometry shared by detections, targets, and the actuator.
//!
//! Detector output uses floating point pixels; anything handed to the
//! actuator is an integer [`Coordinates`] pair.

use serde::{Deserialize, Serialize};

/// Integer pixel position on screen. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[i32; 2]")]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

impl Coordinates {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Shift by a pixel offset without overflowing.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from([x, y]: [f64; 2]) -> Self {
        // `as` saturates on out-of-range floats and maps NaN to 0.
        Self {
            x: x.trunc() as i32,
            y: y.trunc() as i32,
        }
    }
}

impl From<Coordinates> for [i32; 2] {
    fn from(value: Coordinates) -> Self {
        [value.x, value.y]
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned box `[x1, y1, x2, y2]` as produced by object detectors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> Coordinates {
        Coordinates::from([(self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0])
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(value: BoundingBox) -> Self {
        [value.x1, value.y1, value.x2, value.y2]
    }
}

/// Four-point polygon as produced by text detectors, clockwise from top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quad(pub [[f64; 2]; 4]);

impl Quad {
    /// Midpoint of the diagonal between the first and third points.
    pub fn center(&self) -> Coordinates {
        let [first, _, third, _] = self.0;
        Coordinates::from([(first[0] + third[0]) / 2.0, (first[1] + third[1]) / 2.0])
    }
}
