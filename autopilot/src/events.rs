//! Observer notifications emitted by the executor.
//!
//! Delivered over a bounded broadcast channel: sending never blocks, and a
//! receiver that falls behind loses the oldest events (it sees
//! `RecvError::Lagged`). These events are product output for a console; dev
//! diagnostics go through `tracing` instead.

use tokio::sync::broadcast;
use tracing::trace;

use crate::core::plan::Task;

/// Why the executor loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No task left to execute.
    PlanExhausted,
    /// Stop was requested through the cancellation token.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Human-readable progress line.
    Log(String),
    /// Copy of every task after a status change.
    TaskListChanged(Vec<Task>),
    Stopped(StopReason),
}

/// Sending half of the observer channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: AgentEvent) {
        if self.tx.send(event).is_err() {
            trace!("event dropped: no subscribers");
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(AgentEvent::Log(message.into()));
    }

    pub fn tasks_changed(&self, tasks: Vec<Task>) {
        self.emit(AgentEvent::TaskListChanged(tasks));
    }

    pub fn stopped(&self, reason: StopReason) {
        self.emit(AgentEvent::Stopped(reason));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::RecvError;

    use super::*;

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.log("nobody listening");
        let mut rx = bus.subscribe();
        bus.stopped(StopReason::Cancelled);
        assert_eq!(
            rx.recv().await.expect("event"),
            AgentEvent::Stopped(StopReason::Cancelled)
        );
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for n in 0..5 {
            bus.log(format!("line {n}"));
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.expect("event"), AgentEvent::Log("line 3".to_string()));
        assert_eq!(rx.recv().await.expect("event"), AgentEvent::Log("line 4".to_string()));
    }
}
