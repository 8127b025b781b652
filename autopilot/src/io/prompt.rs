//! Prompt rendering for the planner and decider oracle calls.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::snapshot::Snapshot;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const DECIDER_TEMPLATE: &str = include_str!("prompts/decider.md");
const DECIDER_USER_TEMPLATE: &str = include_str!("prompts/decider_user.md");

#[derive(Debug, Serialize)]
struct ObjectContext<'a> {
    name: &'a str,
    center: String,
    confidence: String,
}

#[derive(Debug, Serialize)]
struct TextContext<'a> {
    text: &'a str,
    center: String,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("decider", DECIDER_TEMPLATE)
            .expect("decider template should be valid");
        env.add_template("decider_user", DECIDER_USER_TEMPLATE)
            .expect("decider user template should be valid");
        Self { env }
    }

    /// System instructions for goal decomposition.
    pub fn planner_system(&self) -> Result<String> {
        Ok(self.env.get_template("planner")?.render(context! {})?)
    }

    pub fn planner_user(&self, goal: &str) -> String {
        format!("Goal: {}", goal.trim())
    }

    /// System instructions for choosing the next action.
    pub fn decider_system(&self, risk_level: &str) -> Result<String> {
        let template = self.env.get_template("decider")?;
        Ok(template.render(context! { risk_level => risk_level.trim() })?)
    }

    /// Task plus a text rendering of the snapshot.
    pub fn decider_user(&self, task: &str, snapshot: &Snapshot) -> Result<String> {
        let objects: Vec<_> = snapshot
            .objects
            .iter()
            .map(|object| ObjectContext {
                name: &object.name,
                center: object.bbox.center().to_string(),
                confidence: format!("{:.2}", object.confidence),
            })
            .collect();
        let texts: Vec<_> = snapshot
            .texts
            .iter()
            .map(|text| TextContext {
                text: &text.text,
                center: text.quad.center().to_string(),
            })
            .collect();
        let template = self.env.get_template("decider_user")?;
        Ok(template.render(context! {
            task => task.trim(),
            objects => objects,
            texts => texts,
        })?)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{BoundingBox, Quad};
    use crate::core::snapshot::{ObjectDetection, TextDetection};

    #[test]
    fn planner_prompt_demands_json_list() {
        let engine = PromptEngine::new();
        let system = engine.planner_system().expect("render");
        assert!(system.contains("Return ONLY a JSON array of strings"));
        assert_eq!(engine.planner_user(" Open Chrome "), "Goal: Open Chrome");
    }

    #[test]
    fn decider_prompt_reflects_risk_level() {
        let engine = PromptEngine::new();
        let conservative = engine.decider_system("conservative").expect("render");
        assert!(conservative.contains("Risk level: conservative."));
        assert!(conservative.contains("Prefer waiting"));
        let bold = engine.decider_system("aggressive").expect("render");
        assert!(!bold.contains("Prefer waiting"));
    }

    #[test]
    fn decider_user_lists_detections() {
        let engine = PromptEngine::new();
        let snapshot = Snapshot::new(
            vec![ObjectDetection {
                name: "chrome icon".to_string(),
                bbox: BoundingBox::new(10.0, 20.0, 30.0, 40.0),
                confidence: 0.87,
            }],
            vec![TextDetection {
                text: "Search".to_string(),
                quad: Quad([[100.0, 100.0], [200.0, 100.0], [200.0, 120.0], [100.0, 120.0]]),
                confidence: 0.9,
            }],
        );
        let rendered = engine.decider_user("Open Chrome", &snapshot).expect("render");
        assert!(rendered.contains("Current task: Open Chrome"));
        assert!(rendered.contains("- chrome icon at (20, 30) (confidence 0.87)"));
        assert!(rendered.contains("- \"Search\" at (150, 110)"));
    }

    #[test]
    fn decider_user_handles_empty_snapshot() {
        let engine = PromptEngine::new();
        let rendered = engine
            .decider_user("Wait for load", &Snapshot::default())
            .expect("render");
        assert_eq!(rendered.matches("- none").count(), 2);
    }
}
