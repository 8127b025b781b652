//! Goal decomposition and shared plan progress.
//!
//! [`GoalPlanner`] is a cheap-to-clone handle: the executor and whoever sets
//! goals (CLI, console) hold clones of the same plan. The plan lock is only
//! taken for short reads and updates, never across an oracle await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::core::plan::{Plan, Task};
use crate::io::oracle::DecisionOracle;

/// The task at the cursor, tagged with the plan it came from.
///
/// Passing the ticket back to [`GoalPlanner::complete`] and friends makes the
/// update a no-op if the goal changed (or the cursor moved) in the meantime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentTask {
    pub generation: u64,
    pub index: usize,
    pub description: String,
}

#[derive(Debug, Default)]
struct PlanState {
    goal: Option<String>,
    plan: Plan,
    generation: u64,
}

impl PlanState {
    fn holds(&self, ticket: &CurrentTask) -> bool {
        self.generation == ticket.generation && self.plan.current_index() == ticket.index
    }
}

#[derive(Clone)]
pub struct GoalPlanner {
    oracle: Arc<dyn DecisionOracle>,
    state: Arc<Mutex<PlanState>>,
}

impl GoalPlanner {
    pub fn new(oracle: Arc<dyn DecisionOracle>) -> Self {
        Self {
            oracle,
            state: Arc::new(Mutex::new(PlanState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decompose `goal` and replace the plan, resetting the cursor.
    ///
    /// Any oracle failure (unavailable, timeout, non-list reply) yields a
    /// single task wrapping the goal verbatim. Returns the new task list.
    pub async fn set_goal(&self, goal: &str) -> Vec<Task> {
        info!(goal, "new goal set");
        let plan = match self.oracle.decompose_goal(goal).await {
            Ok(steps) => {
                let plan = Plan::new(steps);
                if plan.is_empty() {
                    warn!("oracle returned no steps; using goal as a single task");
                    Plan::single(goal)
                } else {
                    info!(steps = plan.len(), "plan generated");
                    plan
                }
            }
            Err(err) => {
                warn!(error = %err, "plan generation failed; using goal as a single task");
                Plan::single(goal)
            }
        };
        self.replace(goal, plan)
    }

    /// Install an already-built plan.
    pub fn replace(&self, goal: &str, plan: Plan) -> Vec<Task> {
        let mut state = self.lock();
        state.goal = Some(goal.to_string());
        state.plan = plan;
        state.generation += 1;
        state.plan.tasks().to_vec()
    }

    pub fn oracle(&self) -> Arc<dyn DecisionOracle> {
        Arc::clone(&self.oracle)
    }

    pub fn goal(&self) -> Option<String> {
        self.lock().goal.clone()
    }

    /// Task at the cursor, or `None` once the plan is exhausted.
    pub fn current(&self) -> Option<CurrentTask> {
        let state = self.lock();
        state.plan.current().map(|task| CurrentTask {
            generation: state.generation,
            index: state.plan.current_index(),
            description: task.description.clone(),
        })
    }

    pub fn current_index(&self) -> usize {
        self.lock().plan.current_index()
    }

    /// Copy of every task with its status.
    pub fn status(&self) -> Vec<Task> {
        self.lock().plan.tasks().to_vec()
    }

    /// Mark the current task Completed and advance. No-op at the end.
    pub fn complete_current(&self) -> Option<Task> {
        let completed = self.lock().plan.complete_current();
        if let Some(task) = &completed {
            info!(task = %task.description, "task completed");
        }
        completed
    }

    /// Mark the current task Failed and advance. No-op at the end.
    pub fn fail_current(&self) -> Option<Task> {
        let failed = self.lock().plan.fail_current();
        if let Some(task) = &failed {
            warn!(task = %task.description, "task failed");
        }
        failed
    }

    /// Flag the current task InProgress.
    pub fn mark_in_progress(&self) {
        self.lock().plan.start_current();
    }

    /// Like [`Self::mark_in_progress`], scoped to `ticket`'s task.
    pub fn start(&self, ticket: &CurrentTask) -> bool {
        let mut state = self.lock();
        if !state.holds(ticket) {
            return false;
        }
        state.plan.start_current().is_some()
    }

    /// Complete `ticket`'s task if it is still current.
    pub fn complete(&self, ticket: &CurrentTask) -> Option<Task> {
        let mut state = self.lock();
        if !state.holds(ticket) {
            return None;
        }
        let completed = state.plan.complete_current();
        drop(state);
        if let Some(task) = &completed {
            info!(task = %task.description, "task completed");
        }
        completed
    }

    /// Fail `ticket`'s task if it is still current.
    pub fn fail(&self, ticket: &CurrentTask) -> Option<Task> {
        let mut state = self.lock();
        if !state.holds(ticket) {
            return None;
        }
        let failed = state.plan.fail_current();
        drop(state);
        if let Some(task) = &failed {
            warn!(task = %task.description, "task failed");
        }
        failed
    }

    /// Return `ticket`'s task from InProgress to Pending if still current.
    pub fn release(&self, ticket: &CurrentTask) {
        let mut state = self.lock();
        if state.holds(ticket) {
            state.plan.release_current();
        }
    }
}

impl std::fmt::Debug for GoalPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("GoalPlanner")
            .field("goal", &state.goal)
            .field("generation", &state.generation)
            .field("plan", &state.plan)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::TaskStatus;
    use crate::test_support::ScriptedOracle;

    fn planner(oracle: ScriptedOracle) -> GoalPlanner {
        GoalPlanner::new(Arc::new(oracle))
    }

    #[tokio::test]
    async fn well_formed_decomposition_creates_pending_tasks() {
        let planner = planner(ScriptedOracle::new().with_plan_reply(
            "[\"Locate Chrome icon\",\"Click Chrome icon\"]",
        ));
        let tasks = planner.set_goal("Open Chrome").await;
        assert_eq!(
            tasks,
            vec![
                Task::pending("Locate Chrome icon"),
                Task::pending("Click Chrome icon"),
            ]
        );
        assert_eq!(planner.current_index(), 0);
        assert_eq!(planner.goal().as_deref(), Some("Open Chrome"));
    }

    #[tokio::test]
    async fn malformed_decomposition_falls_back_to_goal() {
        let planner = planner(ScriptedOracle::new().with_plan_reply("not json"));
        let tasks = planner.set_goal("Open Chrome").await;
        assert_eq!(tasks, vec![Task::pending("Open Chrome")]);
    }

    #[tokio::test]
    async fn unavailable_oracle_falls_back_to_goal() {
        let planner = planner(ScriptedOracle::new().with_plan_unavailable());
        let tasks = planner.set_goal("Open Chrome").await;
        assert_eq!(tasks, vec![Task::pending("Open Chrome")]);
    }

    struct NoSteps;

    #[async_trait::async_trait]
    impl DecisionOracle for NoSteps {
        async fn decompose_goal(
            &self,
            _goal: &str,
        ) -> Result<Vec<String>, crate::io::oracle::OracleError> {
            Ok(Vec::new())
        }

        async fn decide_action(
            &self,
            _task: &str,
            _snapshot: &crate::core::snapshot::Snapshot,
        ) -> crate::io::oracle::DecisionReply {
            crate::io::oracle::DecisionReply::local(crate::core::decision::ActionDecision::wait(
                "unused",
            ))
        }
    }

    #[tokio::test]
    async fn empty_decomposition_falls_back_to_goal() {
        let planner = GoalPlanner::new(Arc::new(NoSteps));
        let tasks = planner.set_goal("Open Chrome").await;
        assert_eq!(tasks, vec![Task::pending("Open Chrome")]);
    }

    #[tokio::test]
    async fn set_goal_resets_cursor() {
        let planner = planner(
            ScriptedOracle::new()
                .with_plan_reply("[\"a\", \"b\"]")
                .with_plan_reply("[\"c\"]"),
        );
        planner.set_goal("first").await;
        planner.complete_current();
        assert_eq!(planner.current_index(), 1);

        planner.set_goal("second").await;
        assert_eq!(planner.current_index(), 0);
        assert_eq!(
            planner.current().map(|task| task.description),
            Some("c".to_string())
        );
    }

    #[tokio::test]
    async fn completion_is_idempotent_at_end() {
        let planner = planner(ScriptedOracle::new().with_plan_reply("[\"only\"]"));
        planner.set_goal("g").await;
        assert!(planner.complete_current().is_some());
        assert!(planner.complete_current().is_none());
        assert!(planner.current().is_none());
        assert_eq!(planner.current_index(), 1);
        assert_eq!(planner.status()[0].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn stale_ticket_does_not_touch_new_plan() {
        let planner = planner(
            ScriptedOracle::new()
                .with_plan_reply("[\"old\"]")
                .with_plan_reply("[\"new\"]"),
        );
        planner.set_goal("first").await;
        let ticket = planner.current().expect("task");
        assert!(planner.start(&ticket));

        planner.set_goal("second").await;
        assert!(!planner.start(&ticket));
        assert!(planner.complete(&ticket).is_none());
        planner.release(&ticket);
        assert_eq!(planner.status(), vec![Task::pending("new")]);
    }

    #[tokio::test]
    async fn ticket_lifecycle_updates_status() {
        let planner = planner(ScriptedOracle::new().with_plan_reply("[\"a\", \"b\"]"));
        planner.set_goal("g").await;

        let first = planner.current().expect("task");
        planner.start(&first);
        assert_eq!(planner.status()[0].status, TaskStatus::InProgress);
        planner.release(&first);
        assert_eq!(planner.status()[0].status, TaskStatus::Pending);

        assert!(planner.fail(&first).is_some());
        let second = planner.current().expect("task");
        assert_eq!(second.index, 1);
        planner.mark_in_progress();
        assert!(planner.complete(&second).is_some());
        let statuses: Vec<_> = planner.status().into_iter().map(|task| task.status).collect();
        assert_eq!(statuses, vec![TaskStatus::Failed, TaskStatus::Completed]);
    }
}
