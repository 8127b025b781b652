//! Scripted collaborators for driving the planner and executor in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::core::decision::{ActionDecision, parse_decision, parse_task_list};
use crate::core::geometry::{Coordinates, Quad};
use crate::core::snapshot::{ObjectDetection, Snapshot, TextDetection};
use crate::io::actuator::Actuator;
use crate::io::oracle::{DecisionOracle, DecisionReply, OracleError};
use crate::io::perception::{Frame, Perception};

/// Text detection with an axis-aligned quad `[x1, y1] .. [x2, y2]`.
pub fn text(value: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> TextDetection {
    TextDetection {
        text: value.to_string(),
        quad: Quad([[x1, y1], [x2, y1], [x2, y2], [x1, y2]]),
        confidence: 0.9,
    }
}

/// Snapshot with a single "Search" label centred on (150, 110).
pub fn search_screen() -> Snapshot {
    Snapshot::new(Vec::new(), vec![text("Search", 100.0, 100.0, 200.0, 120.0)])
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum PlanReply {
    Raw(String),
    Unavailable,
}

/// Oracle answering from queued raw replies.
///
/// Plan replies go through the real task-list parser and decision replies
/// through the real decision parser, so malformed text behaves as it would
/// with a live model. Once decisions run out the oracle answers `wait`, or
/// never answers when built with [`ScriptedOracle::stall_when_exhausted`].
#[derive(Default)]
pub struct ScriptedOracle {
    plans: Mutex<VecDeque<PlanReply>>,
    decisions: Mutex<VecDeque<String>>,
    stall: bool,
    asked: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan_reply(self, raw: &str) -> Self {
        lock(&self.plans).push_back(PlanReply::Raw(raw.to_string()));
        self
    }

    pub fn with_plan_unavailable(self) -> Self {
        lock(&self.plans).push_back(PlanReply::Unavailable);
        self
    }

    pub fn with_decision(self, raw: &str) -> Self {
        lock(&self.decisions).push_back(raw.to_string());
        self
    }

    pub fn stall_when_exhausted(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Task descriptions passed to `decide_action`, in call order.
    pub fn asked(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decompose_goal(&self, _goal: &str) -> Result<Vec<String>, OracleError> {
        let reply = lock(&self.plans).pop_front();
        match reply {
            Some(PlanReply::Raw(raw)) => Ok(parse_task_list(&raw)?),
            Some(PlanReply::Unavailable) | None => {
                Err(OracleError::Unavailable("scripted".to_string()))
            }
        }
    }

    async fn decide_action(&self, task: &str, _snapshot: &Snapshot) -> DecisionReply {
        lock(&self.asked).push(task.to_string());
        let next = lock(&self.decisions).pop_front();
        let Some(raw) = next else {
            if self.stall {
                return std::future::pending().await;
            }
            return DecisionReply::local(ActionDecision::wait("script exhausted"));
        };
        let decision =
            parse_decision(&raw).unwrap_or_else(|_| ActionDecision::wait("parse error"));
        DecisionReply {
            decision,
            prompt: format!("task: {task}"),
            response: raw,
        }
    }
}

/// Perception replaying a fixed sequence of screens.
///
/// `None` entries simulate a failed capture. After the script runs out the
/// last entry repeats.
#[derive(Clone)]
pub struct ScriptedPerception {
    screens: Arc<Mutex<VecDeque<Option<Snapshot>>>>,
    last: Arc<Mutex<Option<Option<Snapshot>>>>,
    current: Option<Snapshot>,
    grabs: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl ScriptedPerception {
    pub fn new(screens: Vec<Option<Snapshot>>) -> Self {
        Self {
            screens: Arc::new(Mutex::new(screens.into())),
            last: Arc::new(Mutex::new(None)),
            current: None,
            grabs: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Perception that always shows `snapshot`.
    pub fn fixed(snapshot: Snapshot) -> Self {
        Self::new(vec![Some(snapshot)])
    }

    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Perception for ScriptedPerception {
    async fn grab(&mut self) -> Option<Frame> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.screens).pop_front();
        let screen = match next {
            Some(screen) => {
                *lock(&self.last) = Some(screen.clone());
                screen
            }
            None => lock(&self.last).clone().flatten(),
        };
        self.current = screen;
        self.current.as_ref().map(|_| Frame::default())
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
        self.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorCall {
    MoveTo(Coordinates),
    Click,
    Press(String),
    TypeText(String),
}

/// Actuator recording every call. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<ActuatorCall>>>,
    released: Arc<AtomicBool>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        lock(&self.calls).clone()
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn push(&self, call: ActuatorCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn move_to(&mut self, target: Coordinates) {
        self.push(ActuatorCall::MoveTo(target));
    }

    async fn click(&mut self) {
        self.push(ActuatorCall::Click);
    }

    async fn press(&mut self, key: &str) {
        self.push(ActuatorCall::Press(key.to_string()));
    }

    async fn type_text(&mut self, text: &str) {
        self.push(ActuatorCall::TypeText(text.to_string()));
    }

    async fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
