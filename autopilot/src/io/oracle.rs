//! Reasoning oracle: goal decomposition and next-action decisions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::decision::{ActionDecision, ParseError, parse_decision, parse_task_list};
use crate::core::snapshot::Snapshot;
use crate::io::llm::ChatModel;
use crate::io::prompt::PromptEngine;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed oracle response: {0}")]
    Malformed(#[from] ParseError),
    #[error("no API key configured (set llm.api_key or OPENAI_API_KEY)")]
    MissingApiKey,
}

/// Decision plus the exchange that produced it, kept for the decision log.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionReply {
    pub decision: ActionDecision,
    pub prompt: String,
    pub response: String,
}

impl DecisionReply {
    /// Reply for a decision that did not come from the oracle.
    pub fn local(decision: ActionDecision) -> Self {
        Self {
            decision,
            prompt: String::new(),
            response: String::new(),
        }
    }
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Split a goal into ordered task descriptions.
    async fn decompose_goal(&self, goal: &str) -> Result<Vec<String>, OracleError>;

    /// Choose the next action for `task`. Never fails: any fault becomes a
    /// `wait` decision whose reasoning names the fault.
    async fn decide_action(&self, task: &str, snapshot: &Snapshot) -> DecisionReply;
}

/// Oracle backed by a chat model.
pub struct LlmOracle {
    model: Arc<dyn ChatModel>,
    prompts: PromptEngine,
    risk_level: String,
    timeout: Duration,
}

impl LlmOracle {
    pub fn new(model: Arc<dyn ChatModel>, risk_level: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model,
            prompts: PromptEngine::new(),
            risk_level: risk_level.into(),
            timeout,
        }
    }

    async fn ask(&self, system: &str, user: &str) -> Result<String, OracleError> {
        match tokio::time::timeout(self.timeout, self.model.complete(system, user)).await {
            Ok(reply) => reply,
            Err(_) => Err(OracleError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    #[instrument(skip_all, fields(goal = %goal))]
    async fn decompose_goal(&self, goal: &str) -> Result<Vec<String>, OracleError> {
        let system = self
            .prompts
            .planner_system()
            .map_err(|err| OracleError::Unavailable(format!("render planner prompt: {err}")))?;
        let response = self.ask(&system, &self.prompts.planner_user(goal)).await?;
        let tasks = parse_task_list(&response)?;
        debug!(count = tasks.len(), "goal decomposed");
        Ok(tasks)
    }

    #[instrument(skip_all, fields(task = %task))]
    async fn decide_action(&self, task: &str, snapshot: &Snapshot) -> DecisionReply {
        let rendered = self.prompts.decider_system(&self.risk_level).and_then(|system| {
            let user = self.prompts.decider_user(task, snapshot)?;
            Ok((system, user))
        });
        let (system, user) = match rendered {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "render decider prompt failed");
                return DecisionReply::local(ActionDecision::wait("prompt error"));
            }
        };
        let prompt = format!("{system}\n\n{user}");

        let response = match self.ask(&system, &user).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "decision request failed");
                return DecisionReply {
                    decision: ActionDecision::wait(format!("oracle error: {err}")),
                    prompt,
                    response: String::new(),
                };
            }
        };

        let decision = match parse_decision(&response) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, "unparseable decision");
                ActionDecision::wait("parse error")
            }
        };
        DecisionReply {
            decision,
            prompt,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::decision::{ActionKind, Target};

    /// Chat model replaying canned replies and recording prompts.
    struct CannedChat {
        replies: Mutex<Vec<Result<String, OracleError>>>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl CannedChat {
        fn new(replies: Vec<Result<String, OracleError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for CannedChat {
        async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError> {
            self.seen
                .lock()
                .expect("lock")
                .push((system.to_string(), user.to_string()));
            self.replies
                .lock()
                .expect("lock")
                .pop()
                .unwrap_or_else(|| Err(OracleError::Unavailable("exhausted".to_string())))
        }
    }

    struct StalledChat;

    #[async_trait]
    impl ChatModel for StalledChat {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
            std::future::pending().await
        }
    }

    fn oracle(model: Arc<dyn ChatModel>) -> LlmOracle {
        LlmOracle::new(model, "conservative", Duration::from_secs(30))
    }

    #[tokio::test]
    async fn decomposes_fenced_list() {
        let chat = CannedChat::new(vec![Ok(
            "```json\n[\"Locate Chrome icon\", \"Click Chrome icon\"]\n```".to_string(),
        )]);
        let tasks = oracle(chat.clone())
            .decompose_goal("Open Chrome")
            .await
            .expect("tasks");
        assert_eq!(tasks, vec!["Locate Chrome icon", "Click Chrome icon"]);
        let seen = chat.seen.lock().expect("lock");
        assert_eq!(seen[0].1, "Goal: Open Chrome");
    }

    #[tokio::test]
    async fn decomposition_rejects_non_list() {
        let chat = CannedChat::new(vec![Ok("not json".to_string())]);
        let err = oracle(chat).decompose_goal("Open Chrome").await.unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[tokio::test]
    async fn decision_parses_reply() {
        let chat = CannedChat::new(vec![Ok(
            "{\"action\": \"click\", \"target\": \"Search\", \"reasoning\": \"open search\"}"
                .to_string(),
        )]);
        let reply = oracle(chat).decide_action("Search", &Snapshot::default()).await;
        assert_eq!(reply.decision.action, ActionKind::Click);
        assert_eq!(
            reply.decision.target,
            Some(Target::Symbol("Search".to_string()))
        );
        assert!(reply.prompt.contains("Current task: Search"));
        assert!(reply.response.contains("open search"));
    }

    #[tokio::test]
    async fn unparseable_decision_becomes_wait() {
        let chat = CannedChat::new(vec![Ok("I think you should click".to_string())]);
        let reply = oracle(chat).decide_action("t", &Snapshot::default()).await;
        assert_eq!(reply.decision, ActionDecision::wait("parse error"));
        assert_eq!(reply.response, "I think you should click");
    }

    #[tokio::test]
    async fn unavailable_oracle_becomes_wait() {
        let chat = CannedChat::new(vec![Err(OracleError::Unavailable("401".to_string()))]);
        let reply = oracle(chat).decide_action("t", &Snapshot::default()).await;
        assert_eq!(reply.decision.action, ActionKind::Wait);
        assert!(reply.decision.reasoning.contains("401"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_oracle_times_out() {
        let err = oracle(Arc::new(StalledChat))
            .decompose_goal("Open Chrome")
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Timeout(_)));
    }
}
