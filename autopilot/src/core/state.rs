//! Flatten a snapshot into the key/value state seen by reflex rules.
//!
//! Keys produced:
//! - `objects`, `texts`: number of detections of each kind
//! - `object.<name>`: count of objects with that (lowercased) name
//! - `<label>`: numeric readouts found in text, e.g. `HP: 20/100` gives
//!   `hp = 20`; the first readout for a label wins

use std::sync::LazyLock;

use regex::Regex;

use crate::core::condition::Scalar;
use crate::core::rules::StateMap;
use crate::core::snapshot::Snapshot;

static READOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z _]*?)\s*[:=]\s*(-?\d+(?:\.\d+)?)\s*(?:/\s*\d+(?:\.\d+)?)?\s*$")
        .expect("readout regex is valid")
});

pub fn flatten(snapshot: &Snapshot) -> StateMap {
    let mut state = StateMap::new();
    state.insert(
        "objects".to_string(),
        Scalar::Number(snapshot.objects.len() as f64),
    );
    state.insert(
        "texts".to_string(),
        Scalar::Number(snapshot.texts.len() as f64),
    );

    for object in &snapshot.objects {
        let key = format!("object.{}", normalize_label(&object.name));
        let entry = state.entry(key).or_insert(Scalar::Number(0.0));
        if let Scalar::Number(count) = entry {
            *count += 1.0;
        }
    }

    for text in &snapshot.texts {
        let Some(caps) = READOUT_RE.captures(&text.text) else {
            continue;
        };
        let label = normalize_label(&caps[1]);
        let Ok(value) = caps[2].parse::<f64>() else {
            continue;
        };
        state.entry(label).or_insert(Scalar::Number(value));
    }

    state
}

fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{BoundingBox, Quad};
    use crate::core::snapshot::{ObjectDetection, TextDetection};

    fn text(value: &str) -> TextDetection {
        TextDetection {
            text: value.to_string(),
            quad: Quad([[0.0, 0.0]; 4]),
            confidence: 1.0,
        }
    }

    fn object(name: &str) -> ObjectDetection {
        ObjectDetection {
            name: name.to_string(),
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            confidence: 1.0,
        }
    }

    #[test]
    fn counts_detections() {
        let snapshot = Snapshot::new(
            vec![object("Enemy"), object("enemy"), object("chest")],
            vec![text("Inventory")],
        );
        let state = flatten(&snapshot);
        assert_eq!(state.get("objects"), Some(&Scalar::Number(3.0)));
        assert_eq!(state.get("texts"), Some(&Scalar::Number(1.0)));
        assert_eq!(state.get("object.enemy"), Some(&Scalar::Number(2.0)));
        assert_eq!(state.get("object.chest"), Some(&Scalar::Number(1.0)));
    }

    #[test]
    fn extracts_labeled_readouts() {
        let snapshot = Snapshot::new(
            Vec::new(),
            vec![
                text("HP: 20/100"),
                text("Gold = 1500"),
                text("Move Speed: 1.5"),
                text("HP: 99"),
                text("Quest: find the key"),
            ],
        );
        let state = flatten(&snapshot);
        assert_eq!(state.get("hp"), Some(&Scalar::Number(20.0)));
        assert_eq!(state.get("gold"), Some(&Scalar::Number(1500.0)));
        assert_eq!(state.get("move_speed"), Some(&Scalar::Number(1.5)));
        assert_eq!(state.get("quest"), None);
    }
}
