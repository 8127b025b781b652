//! Perceive-decide-act control loop.
//!
//! Each cycle walks `Fetching → Perceiving → Deciding → Acting → Advancing`:
//! take the task at the plan cursor, grab and analyse a frame, consult the
//! reflex rules (then the oracle on a miss), resolve the target and drive the
//! actuator, and finally advance the plan when the action succeeded.
//!
//! Reflex actions are dispatched like any other decision but never touch the
//! plan: the current task stays where it was and the oracle is consulted for
//! it once the reflex condition clears.
//!
//! The loop stops when the plan is exhausted or the cancellation token fires.
//! Every blocking await (frame grab, detectors, oracle, pauses) is raced
//! against the token; actuator calls are not, so an action is never cut in
//! half. On the way out the current task goes back to Pending if it was
//! InProgress, and perception and actuator are released.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::decision::{ActionDecision, ActionKind, Target};
use crate::core::resolver::resolve;
use crate::core::rules::RuleEngine;
use crate::core::snapshot::Snapshot;
use crate::core::state::flatten;
use crate::events::{EventBus, StopReason};
use crate::io::actuator::Actuator;
use crate::io::config::ExecutorConfig;
use crate::io::decision_log::DecisionLog;
use crate::io::oracle::DecisionReply;
use crate::io::perception::{Frame, Perception};
use crate::planner::{CurrentTask, GoalPlanner};

/// Loop timing and retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub cycle_pause: Duration,
    pub perception_retry: Duration,
    pub wait_pause: Duration,
    /// Fail the task after this many consecutive unresolved clicks.
    pub max_click_retries: Option<u32>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for ExecutorSettings {
    fn from(cfg: &ExecutorConfig) -> Self {
        Self {
            cycle_pause: Duration::from_millis(cfg.cycle_pause_ms),
            perception_retry: Duration::from_millis(cfg.perception_retry_ms),
            wait_pause: Duration::from_millis(cfg.wait_pause_ms),
            max_click_retries: cfg.max_click_retries,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Cycles that reached the deciding state.
    pub cycles: u64,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub stop: StopReason,
}

/// What dispatching a decision did, before the plan is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// The action ran (or needs no actuator call).
    Done,
    /// A click target could not be resolved.
    Missed,
    /// Nothing to send: missing value.
    Skipped,
    Waited,
}

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    /// No task at the cursor.
    Exhausted,
    /// Perception produced no frame.
    NoFrame,
    /// The current task was resolved and the cursor moved.
    Advanced,
    /// The oracle asked to wait.
    Waited,
    /// An action was attempted (or skipped) without resolving the task.
    Stalled,
    Cancelled,
}

/// Consecutive unresolved clicks for one task.
#[derive(Debug)]
struct ClickMisses {
    ticket: CurrentTask,
    count: u32,
}

pub struct Executor<P, A> {
    planner: GoalPlanner,
    rules: RuleEngine,
    perception: P,
    actuator: A,
    events: EventBus,
    decision_log: Option<DecisionLog>,
    settings: ExecutorSettings,
    misses: Option<ClickMisses>,
    cycles: u64,
    tasks_completed: usize,
    tasks_failed: usize,
}

impl<P: Perception, A: Actuator> Executor<P, A> {
    pub fn new(planner: GoalPlanner, perception: P, actuator: A) -> Self {
        Self {
            planner,
            rules: RuleEngine::new(),
            perception,
            actuator,
            events: EventBus::default(),
            decision_log: None,
            settings: ExecutorSettings::default(),
            misses: None,
            cycles: 0,
            tasks_completed: 0,
            tasks_failed: 0,
        }
    }

    pub fn with_rules(mut self, rules: RuleEngine) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_decision_log(mut self, log: DecisionLog) -> Self {
        self.decision_log = Some(log);
        self
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Bus the loop reports on; subscribe before starting to see every event.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run until the plan is exhausted or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> RunOutcome {
        info!("executor started");
        self.events.log("Auto-pilot started.");

        let stop = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let pause = match self.run_cycle(&cancel).await {
                Cycle::Exhausted => {
                    self.events.log("No pending tasks. Auto-pilot finished.");
                    break StopReason::PlanExhausted;
                }
                Cycle::Cancelled => break StopReason::Cancelled,
                Cycle::NoFrame => self.settings.perception_retry,
                Cycle::Waited => self.settings.wait_pause + self.settings.cycle_pause,
                Cycle::Advanced | Cycle::Stalled => self.settings.cycle_pause,
            };

            if !pause_unless_cancelled(&cancel, pause).await {
                break StopReason::Cancelled;
            }
        };

        self.shutdown(stop).await
    }

    /// Run on a dedicated tokio task.
    pub fn spawn(self) -> ExecutorHandle
    where
        P: 'static,
        A: 'static,
    {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(self.run(cancel.clone()));
        ExecutorHandle { cancel, join }
    }

    async fn run_cycle(&mut self, cancel: &CancellationToken) -> Cycle {
        let Some(ticket) = self.planner.current() else {
            return Cycle::Exhausted;
        };
        self.planner.start(&ticket);
        self.events
            .log(format!("Executing task: {}", ticket.description));

        let cycle = self.work(&ticket, cancel).await;

        // Leaves a resolved task alone: the ticket no longer matches the cursor.
        self.planner.release(&ticket);
        cycle
    }

    #[instrument(skip_all, fields(task = %ticket.description, index = ticket.index))]
    async fn work(&mut self, ticket: &CurrentTask, cancel: &CancellationToken) -> Cycle {
        let Some(grabbed) = until_cancelled(cancel, self.perception.grab()).await else {
            return Cycle::Cancelled;
        };
        let Some(frame) = grabbed else {
            warn!("no frame from perception");
            self.events.log("Failed to grab screen.");
            return Cycle::NoFrame;
        };

        let Some(objects) = until_cancelled(cancel, self.perception.detect_objects(&frame)).await
        else {
            return Cycle::Cancelled;
        };
        let Some(texts) = until_cancelled(cancel, self.perception.detect_text(&frame)).await else {
            return Cycle::Cancelled;
        };
        let snapshot = Snapshot::new(objects, texts);
        debug!(
            objects = snapshot.objects.len(),
            texts = snapshot.texts.len(),
            "snapshot ready"
        );

        let reflex = if self.rules.is_empty() {
            None
        } else {
            self.rules.evaluate(&flatten(&snapshot))
        };
        let reflexed = reflex.is_some();
        let reply = match reflex {
            Some(name) => {
                info!(rule = name, "reflex rule fired");
                self.events.log(format!("Reflex: {name}"));
                DecisionReply::local(ActionDecision::from_reflex(name))
            }
            None => {
                let oracle = self.planner.oracle();
                let decided =
                    until_cancelled(cancel, oracle.decide_action(&ticket.description, &snapshot))
                        .await;
                match decided {
                    Some(reply) => reply,
                    None => return Cycle::Cancelled,
                }
            }
        };
        self.cycles += 1;

        let decision = &reply.decision;
        let reasoning = if decision.reasoning.trim().is_empty() {
            "No reasoning"
        } else {
            decision.reasoning.trim()
        };
        self.events.log(format!("Decision: {reasoning}"));
        self.record(&frame, &reply).await;

        let dispatch = self.act(decision, &snapshot).await;
        match (dispatch, reflexed) {
            (Dispatch::Waited, _) => Cycle::Waited,
            (_, true) => {
                debug!("reflex action leaves the current task unchanged");
                Cycle::Stalled
            }
            (Dispatch::Done, false) => self.advance(ticket),
            (Dispatch::Missed, false) => self.click_missed(ticket),
            (Dispatch::Skipped, false) => Cycle::Stalled,
        }
    }

    async fn act(&mut self, decision: &ActionDecision, snapshot: &Snapshot) -> Dispatch {
        match decision.action {
            ActionKind::Click => {
                let Some(target) = &decision.target else {
                    self.events.log("Click decision without a target.");
                    return Dispatch::Missed;
                };
                match resolve(target, snapshot) {
                    Some(at) => {
                        self.actuator.move_to(at).await;
                        self.actuator.click().await;
                        self.events.log(format!("Clicked at {at}"));
                        Dispatch::Done
                    }
                    None => {
                        self.events
                            .log(format!("Target {target} not found on screen."));
                        Dispatch::Missed
                    }
                }
            }
            ActionKind::Type => {
                let Some(value) = present(&decision.value) else {
                    self.events.log("Type decision without a value; skipped.");
                    return Dispatch::Skipped;
                };
                if let Some(target) = &decision.target {
                    self.focus(target, snapshot).await;
                }
                self.actuator.type_text(value).await;
                self.events.log(format!("Typed '{value}'"));
                Dispatch::Done
            }
            ActionKind::Press => {
                let Some(key) = present(&decision.value) else {
                    self.events.log("Press decision without a key; skipped.");
                    return Dispatch::Skipped;
                };
                self.actuator.press(key).await;
                self.events.log(format!("Pressed '{key}'"));
                Dispatch::Done
            }
            ActionKind::Finish => Dispatch::Done,
            ActionKind::Wait => Dispatch::Waited,
        }
    }

    /// Best-effort click on a text field before typing into it.
    async fn focus(&mut self, target: &Target, snapshot: &Snapshot) {
        match resolve(target, snapshot) {
            Some(at) => {
                self.actuator.move_to(at).await;
                self.actuator.click().await;
            }
            None => debug!(%target, "type target not found; typing without focus"),
        }
    }

    fn advance(&mut self, ticket: &CurrentTask) -> Cycle {
        self.misses = None;
        let Some(task) = self.planner.complete(ticket) else {
            // Goal replaced mid-cycle; the new plan starts untouched.
            debug!("plan changed during cycle; completion dropped");
            return Cycle::Stalled;
        };
        self.tasks_completed += 1;
        self.events
            .log(format!("Task completed: {}", task.description));
        self.events.tasks_changed(self.planner.status());
        Cycle::Advanced
    }

    fn click_missed(&mut self, ticket: &CurrentTask) -> Cycle {
        let count = match &mut self.misses {
            Some(misses) if misses.ticket == *ticket => {
                misses.count += 1;
                misses.count
            }
            _ => {
                self.misses = Some(ClickMisses {
                    ticket: ticket.clone(),
                    count: 1,
                });
                1
            }
        };

        let Some(limit) = self.settings.max_click_retries else {
            return Cycle::Stalled;
        };
        if count < limit {
            return Cycle::Stalled;
        }

        self.misses = None;
        let Some(task) = self.planner.fail(ticket) else {
            return Cycle::Stalled;
        };
        self.tasks_failed += 1;
        self.events.log(format!(
            "Task failed after {count} unresolved clicks: {}",
            task.description
        ));
        self.events.tasks_changed(self.planner.status());
        Cycle::Advanced
    }

    async fn record(&mut self, frame: &Frame, reply: &DecisionReply) {
        let Some(log) = self.decision_log.as_mut() else {
            return;
        };
        if let Err(err) = log
            .record(Some(frame), &reply.prompt, &reply.response, &reply.decision)
            .await
        {
            warn!(error = %format!("{err:#}"), "decision log write failed");
        }
    }

    async fn shutdown(mut self, stop: StopReason) -> RunOutcome {
        self.perception.release().await;
        self.actuator.release().await;
        info!(?stop, cycles = self.cycles, "executor stopped");
        self.events.log("Auto-pilot stopped.");
        self.events.stopped(stop);
        RunOutcome {
            cycles: self.cycles,
            tasks_completed: self.tasks_completed,
            tasks_failed: self.tasks_failed,
            stop,
        }
    }
}

/// Handle to an executor running on its own task.
#[derive(Debug)]
pub struct ExecutorHandle {
    cancel: CancellationToken,
    join: JoinHandle<RunOutcome>,
}

impl ExecutorHandle {
    /// Request a cooperative stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to return.
    pub async fn join(self) -> Result<RunOutcome> {
        self.join.await.context("executor task panicked")
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// `None` if `cancel` fires before `fut` completes.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Sleep for `duration`; `false` if cancelled first.
async fn pause_unless_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    until_cancelled(cancel, tokio::time::sleep(duration))
        .await
        .is_some()
}
