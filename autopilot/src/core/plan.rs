//! Ordered task list with a forward-only progress cursor.

use serde::{Deserialize, Serialize};

/// Lifecycle of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// One step of a plan. Also the read-only view handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    pub status: TaskStatus,
}

impl Task {
    pub fn pending(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TaskStatus::Pending,
        }
    }
}

/// Ordered tasks plus the index of the next unresolved one.
///
/// Invariants:
/// - `current_index <= tasks.len()`
/// - every task before `current_index` is Completed or Failed
/// - `current_index` never decreases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    tasks: Vec<Task>,
    current_index: usize,
}

impl Plan {
    pub fn new<I, S>(descriptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tasks: descriptions.into_iter().map(Task::pending).collect(),
            current_index: 0,
        }
    }

    /// Plan made of the goal itself, used when decomposition is unavailable.
    pub fn single(goal: &str) -> Self {
        Self::new([goal])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.tasks.len()
    }

    pub fn current(&self) -> Option<&Task> {
        self.tasks.get(self.current_index)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Mark the current task Completed and advance. No-op at the end.
    pub fn complete_current(&mut self) -> Option<Task> {
        self.resolve_current(TaskStatus::Completed)
    }

    /// Mark the current task Failed and advance. No-op at the end.
    pub fn fail_current(&mut self) -> Option<Task> {
        self.resolve_current(TaskStatus::Failed)
    }

    /// Flag the current task as being worked on.
    pub fn start_current(&mut self) -> Option<&Task> {
        let task = self.tasks.get_mut(self.current_index)?;
        task.status = TaskStatus::InProgress;
        Some(task)
    }

    /// Return an InProgress current task to Pending. Used when a cycle ends
    /// without resolving it, so no task is left InProgress between cycles.
    pub fn release_current(&mut self) {
        if let Some(task) = self.tasks.get_mut(self.current_index)
            && task.status == TaskStatus::InProgress
        {
            task.status = TaskStatus::Pending;
        }
    }

    fn resolve_current(&mut self, status: TaskStatus) -> Option<Task> {
        let task = self.tasks.get_mut(self.current_index)?;
        task.status = status;
        let resolved = task.clone();
        self.current_index += 1;
        Some(resolved)
    }
}
